//! Delivery of assignee notifications and the digest.
//!
//! Every send is independent: a failure is logged and counted, and the
//! remaining messages still go out.

use async_trait::async_trait;
use chrono::NaiveDate;
use indexmap::IndexSet;
use planebot_slack::{SlackBot, SlackMessageContent, SlackResult};
use planebot_tracker::Issue;
use tracing::{debug, error, info, warn};

use crate::categorize::CategorizedIssues;
use crate::format::{LinkBuilder, format_assignee_message, format_digest};
use crate::mapping::MappingTable;

/// Where messages are delivered.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Open the direct-message channel with `user_id` and return its id.
    async fn open_direct_channel(&self, user_id: &str) -> SlackResult<String>;

    /// Post `text` to `channel`.
    async fn post_message(&self, channel: &str, text: &str) -> SlackResult<()>;
}

#[async_trait]
impl ChatSink for SlackBot {
    async fn open_direct_channel(&self, user_id: &str) -> SlackResult<String> {
        SlackBot::open_direct_channel(self, user_id).await
    }

    async fn post_message(&self, channel: &str, text: &str) -> SlackResult<()> {
        self.send_message(channel, SlackMessageContent::text(text).without_unfurl())
            .await
            .map(|_| ())
    }
}

/// Outcome of one assignee notification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages delivered.
    pub sent: usize,
    /// (issue id, tracker user id) pairs without a Slack mapping.
    pub unmapped: Vec<(String, String)>,
    /// (issue id, Slack user id) pairs whose delivery failed.
    pub failed: Vec<(String, String)>,
}

/// Formats and sends notifications.
pub struct Dispatcher<'a> {
    chat: &'a dyn ChatSink,
    links: &'a LinkBuilder,
}

impl<'a> Dispatcher<'a> {
    pub fn new(chat: &'a dyn ChatSink, links: &'a LinkBuilder) -> Self {
        Self { chat, links }
    }

    /// Send one direct message per (issue, mapped assignee) pair.
    pub async fn notify_assignees<'i, I>(&self, issues: I, mapping: &MappingTable) -> DispatchReport
    where
        I: IntoIterator<Item = &'i Issue>,
    {
        let mut report = DispatchReport::default();

        for issue in issues {
            if issue.assignees.is_empty() {
                continue;
            }
            let message = format_assignee_message(issue, self.links);

            // one message per distinct assignee, first-seen order
            let assignees: IndexSet<&String> = issue.assignees.iter().collect();
            for assignee in assignees {
                let Some(chat_user) = mapping.get(assignee) else {
                    warn!(
                        issue_id = %issue.id,
                        assignee = %assignee,
                        "No Slack user mapped for assignee, skipping"
                    );
                    report.unmapped.push((issue.id.clone(), assignee.clone()));
                    continue;
                };

                match self.send_direct(chat_user, &message).await {
                    Ok(()) => {
                        debug!(issue_id = %issue.id, chat_user, "Sent assignee notification");
                        report.sent += 1;
                    }
                    Err(e) => {
                        error!(
                            issue_id = %issue.id,
                            chat_user,
                            error = %e,
                            "Failed to send assignee notification"
                        );
                        report.failed.push((issue.id.clone(), chat_user.to_string()));
                    }
                }
            }
        }

        info!(
            sent = report.sent,
            unmapped = report.unmapped.len(),
            failed = report.failed.len(),
            "Assignee notifications finished"
        );
        report
    }

    async fn send_direct(&self, chat_user: &str, message: &str) -> SlackResult<()> {
        let channel = self.chat.open_direct_channel(chat_user).await?;
        self.chat.post_message(&channel, message).await
    }

    /// Send the digest for `date` to `channel`.
    pub async fn send_digest(
        &self,
        categorized: &CategorizedIssues,
        date: NaiveDate,
        channel: &str,
    ) -> SlackResult<()> {
        let message = format_digest(categorized, date, self.links);
        match self.chat.post_message(channel, &message).await {
            Ok(()) => {
                info!(channel, issues = categorized.total(), "Sent daily digest");
                Ok(())
            }
            Err(e) => {
                error!(channel, error = %e, "Failed to send daily digest");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::UserMapping;
    use crate::states::StateIndex;
    use crate::testing::{FakeChat, issue};

    fn mapping(pairs: &[(&str, &str)]) -> MappingTable {
        pairs
            .iter()
            .map(|(external, chat)| UserMapping {
                external_id: external.to_string(),
                chat_id: chat.to_string(),
            })
            .collect()
    }

    fn links() -> LinkBuilder {
        LinkBuilder::new("https://app.plane.so", "acme")
    }

    #[tokio::test]
    async fn test_one_message_per_mapped_assignee() {
        let chat = FakeChat::new();
        let links = links();
        let dispatcher = Dispatcher::new(&chat, &links);

        let issues = vec![
            issue("I1", "P1", "S1", &["U1", "U2", "U3"]),
            issue("I2", "P1", "S1", &[]),
        ];
        let table = mapping(&[("U1", "slack-U1"), ("U3", "slack-U3")]);

        let report = dispatcher.notify_assignees(&issues, &table).await;

        assert_eq!(report.sent, 2);
        assert_eq!(report.unmapped, vec![("I1".to_string(), "U2".to_string())]);
        assert!(report.failed.is_empty());

        let posts = chat.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].0, "D-slack-U1");
        assert_eq!(posts[1].0, "D-slack-U3");
        assert!(posts[0].1.contains("Issue ID: I1"));
    }

    #[tokio::test]
    async fn test_repeated_assignee_gets_one_message() {
        let chat = FakeChat::new();
        let links = links();
        let dispatcher = Dispatcher::new(&chat, &links);

        let issues = vec![issue("I1", "P1", "S1", &["U1", "U2", "U1"])];
        let table = mapping(&[("U1", "slack-U1")]);

        let report = dispatcher.notify_assignees(&issues, &table).await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.unmapped, vec![("I1".to_string(), "U2".to_string())]);
        let posts = chat.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "D-slack-U1");
    }

    #[tokio::test]
    async fn test_no_mapping_sends_nothing() {
        let chat = FakeChat::new();
        let links = links();
        let dispatcher = Dispatcher::new(&chat, &links);

        let issues = vec![issue("I1", "P1", "S1", &["U1", "U2"])];
        let report = dispatcher
            .notify_assignees(&issues, &MappingTable::default())
            .await;

        assert_eq!(report.sent, 0);
        assert_eq!(report.unmapped.len(), 2);
        assert!(chat.posts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_does_not_stop_others() {
        let chat = FakeChat::new().failing_user("slack-U1");
        let links = links();
        let dispatcher = Dispatcher::new(&chat, &links);

        let issues = vec![
            issue("I1", "P1", "S1", &["U1"]),
            issue("I2", "P1", "S1", &["U2"]),
        ];
        let table = mapping(&[("U1", "slack-U1"), ("U2", "slack-U2")]);

        let report = dispatcher.notify_assignees(&issues, &table).await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, vec![("I1".to_string(), "slack-U1".to_string())]);
        assert_eq!(chat.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_send_digest() {
        let chat = FakeChat::new();
        let links = links();
        let dispatcher = Dispatcher::new(&chat, &links);

        let mut index = StateIndex::new();
        index.insert("P1", "S1", "Todo");
        let issues = vec![issue("I1", "P1", "S1", &[])];
        let categorized = crate::categorize::categorize(&issues, &index);

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        dispatcher
            .send_digest(&categorized, date, "C-OVERVIEW")
            .await
            .unwrap();

        let posts = chat.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "C-OVERVIEW");
        assert!(posts[0].1.contains("*Todo*"));
    }

    #[tokio::test]
    async fn test_send_digest_failure_is_returned() {
        let chat = FakeChat::new().failing_channel("C-OVERVIEW");
        let links = links();
        let dispatcher = Dispatcher::new(&chat, &links);

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let result = dispatcher
            .send_digest(&CategorizedIssues::default(), date, "C-OVERVIEW")
            .await;
        assert!(result.is_err());
    }
}
