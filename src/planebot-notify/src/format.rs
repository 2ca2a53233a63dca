//! Message text for assignee notifications and the daily digest.

use chrono::NaiveDate;
use planebot_slack::{escape_mrkdwn, mrkdwn_link};
use planebot_tracker::Issue;

use crate::categorize::CategorizedIssues;
use crate::rich_text::html_to_plain_text;

/// Builds deep links into the tracker web app.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    app_url: String,
    workspace_slug: String,
}

impl LinkBuilder {
    pub fn new(app_url: impl Into<String>, workspace_slug: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into().trim_end_matches('/').to_string(),
            workspace_slug: workspace_slug.into(),
        }
    }

    /// `{app_url}/{slug}/projects/{project}/issues/{issue}`
    pub fn issue_url(&self, project_id: &str, issue_id: &str) -> String {
        format!(
            "{}/{}/projects/{}/issues/{}",
            self.app_url, self.workspace_slug, project_id, issue_id
        )
    }
}

/// Direct message sent to one assignee of `issue`.
pub fn format_assignee_message(issue: &Issue, links: &LinkBuilder) -> String {
    let due_date = issue
        .due_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "None".to_string());
    let priority = if issue.priority.trim().is_empty() {
        "none"
    } else {
        issue.priority.as_str()
    };
    let description = html_to_plain_text(&issue.description_html);
    let description = if description.is_empty() {
        "(no description)".to_string()
    } else {
        escape_mrkdwn(&description)
    };

    format!(
        "Issue: {}\nIssue ID: {}\nDue Date: {}\nPriority: {}\nLink: {}\nDescription: {}\n",
        escape_mrkdwn(&issue.name),
        issue.id,
        due_date,
        escape_mrkdwn(priority),
        mrkdwn_link(&links.issue_url(&issue.project, &issue.id), "Plane"),
        description,
    )
}

/// Digest message: a dated header, then one section per state in display
/// order, each listing its issues as links.
pub fn format_digest(categorized: &CategorizedIssues, date: NaiveDate, links: &LinkBuilder) -> String {
    let mut message = format!(
        "*Here's the daily overview of issues for {}:*\n\n",
        date.format("%Y-%m-%d")
    );

    if categorized.is_empty() {
        message.push_str("No open issues\n");
        return message;
    }

    for (state, issues) in categorized.in_display_order() {
        message.push_str(&format!("*{}*\n", escape_mrkdwn(state)));
        for issue in issues {
            let url = links.issue_url(&issue.project, &issue.id);
            message.push_str(&format!("\u{2022} {}\n", mrkdwn_link(&url, &issue.name)));
        }
        message.push('\n');
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::categorize;
    use crate::states::StateIndex;
    use crate::testing::issue;

    fn links() -> LinkBuilder {
        LinkBuilder::new("https://app.plane.so/", "acme")
    }

    #[test]
    fn test_issue_url() {
        assert_eq!(
            links().issue_url("P1", "I1"),
            "https://app.plane.so/acme/projects/P1/issues/I1"
        );
    }

    #[test]
    fn test_assignee_message() {
        let mut item = issue("I1", "P1", "S1", &["U1"]);
        item.name = "Fix login".to_string();
        item.priority = "high".to_string();
        item.due_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        item.description_html = "<p>Users cannot <b>log in</b></p>".to_string();

        let message = format_assignee_message(&item, &links());
        assert_eq!(
            message,
            "Issue: Fix login\n\
             Issue ID: I1\n\
             Due Date: 2024-05-01\n\
             Priority: high\n\
             Link: <https://app.plane.so/acme/projects/P1/issues/I1|Plane>\n\
             Description: Users cannot log in\n"
        );
    }

    #[test]
    fn test_assignee_message_missing_fields() {
        let item = issue("I2", "P1", "S1", &["U1"]);
        let message = format_assignee_message(&item, &links());

        assert!(message.contains("Due Date: None\n"));
        assert!(message.contains("Priority: none\n"));
        assert!(message.contains("Description: (no description)\n"));
    }

    #[test]
    fn test_assignee_message_escapes_markup() {
        let mut item = issue("I3", "P1", "S1", &[]);
        item.name = "a < b".to_string();
        item.description_html = "<p>x &lt;@channel&gt;</p>".to_string();

        let message = format_assignee_message(&item, &links());
        assert!(message.contains("Issue: a &lt; b\n"));
        assert!(message.contains("Description: x &lt;@channel&gt;\n"));
    }

    #[test]
    fn test_digest_sections_in_display_order() {
        let mut index = StateIndex::new();
        index.insert("P1", "S1", "Todo");
        index.insert("P1", "S2", "Done");
        index.insert("P1", "S3", "Review");

        let mut i1 = issue("I1", "P1", "S3", &[]);
        i1.name = "Write docs".to_string();
        let mut i2 = issue("I2", "P1", "S2", &[]);
        i2.name = "Ship it".to_string();
        let mut i3 = issue("I3", "P1", "S1", &[]);
        i3.name = "Plan".to_string();

        let categorized = categorize(&[i1, i2, i3], &index);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let digest = format_digest(&categorized, date, &links());

        assert_eq!(
            digest,
            "*Here's the daily overview of issues for 2024-05-01:*\n\n\
             *Todo*\n\
             \u{2022} <https://app.plane.so/acme/projects/P1/issues/I3|Plan>\n\n\
             *Done*\n\
             \u{2022} <https://app.plane.so/acme/projects/P1/issues/I2|Ship it>\n\n\
             *Review*\n\
             \u{2022} <https://app.plane.so/acme/projects/P1/issues/I1|Write docs>\n\n"
        );
    }

    #[test]
    fn test_empty_digest() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let digest = format_digest(&CategorizedIssues::default(), date, &links());
        assert_eq!(
            digest,
            "*Here's the daily overview of issues for 2024-05-01:*\n\nNo open issues\n"
        );
    }
}
