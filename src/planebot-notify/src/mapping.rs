//! Tracker user to Slack user mapping, persisted as a two-column CSV file.
//!
//! New keys are appended to the file. Replacing or deleting a row rewrites
//! the whole table into a temp file in the same directory and renames it
//! over the original, so a concurrent reader sees either the old table or
//! the new one. Writers are serialized by a mutex held by the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::MappingError;

/// Header row written to new files when header mode is on.
pub const MAPPING_HEADER: &str = "external_user_id,chat_user_id";

/// One mapping row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMapping {
    /// Tracker user id.
    pub external_id: String,
    /// Slack user id.
    pub chat_id: String,
}

/// Snapshot of the mapping table, read once per dispatch run.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: HashMap<String, String>,
}

impl MappingTable {
    /// Slack user id for a tracker user id.
    pub fn get(&self, external_id: &str) -> Option<&str> {
        self.entries.get(external_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<UserMapping> for MappingTable {
    fn from_iter<I: IntoIterator<Item = UserMapping>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|row| (row.external_id, row.chat_id))
                .collect(),
        }
    }
}

/// Whether `add` created a row or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Replaced,
}

/// File-backed mapping store.
#[derive(Debug)]
pub struct UserMappingStore {
    path: PathBuf,
    header: bool,
    write_lock: Mutex<()>,
}

impl UserMappingStore {
    /// Store backed by `path`. With `header`, new files start with
    /// [`MAPPING_HEADER`].
    pub fn new(path: impl Into<PathBuf>, header: bool) -> Self {
        Self {
            path: path.into(),
            header,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all rows in file order. A missing file is an empty table.
    ///
    /// When a key occurs twice the later row wins.
    pub async fn load_rows(&self) -> Result<Vec<UserMapping>, MappingError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Mapping file missing, using empty table");
                return Ok(Vec::new());
            }
            Err(e) => return Err(MappingError::io(&self.path, e)),
        };

        let mut rows: Vec<UserMapping> = Vec::new();
        let mut first_record = true;
        for (index, record) in parse_records(&content).into_iter().enumerate() {
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            // the header, if any, is the first non-blank record
            let is_first = std::mem::replace(&mut first_record, false);
            if record.len() < 2 {
                warn!(
                    path = %self.path.display(),
                    record = index + 1,
                    "Skipping mapping row with fewer than two columns"
                );
                continue;
            }

            let external_id = record[0].trim();
            let chat_id = record[1].trim();
            if is_first && is_header(external_id, chat_id) {
                continue;
            }
            if external_id.is_empty() || chat_id.is_empty() {
                warn!(
                    path = %self.path.display(),
                    record = index + 1,
                    "Skipping mapping row with an empty column"
                );
                continue;
            }

            if let Some(existing) = rows.iter_mut().find(|r| r.external_id == external_id) {
                warn!(external_id, "Duplicate mapping row, keeping the later one");
                existing.chat_id = chat_id.to_string();
            } else {
                rows.push(UserMapping {
                    external_id: external_id.to_string(),
                    chat_id: chat_id.to_string(),
                });
            }
        }

        Ok(rows)
    }

    /// Read the whole table.
    pub async fn load(&self) -> Result<MappingTable, MappingError> {
        Ok(self.load_rows().await?.into_iter().collect())
    }

    /// Slack user id mapped to `external_id`.
    pub async fn lookup(&self, external_id: &str) -> Result<Option<String>, MappingError> {
        Ok(self.load().await?.get(external_id).map(str::to_string))
    }

    /// Map `external_id` to `chat_id`, replacing any existing row for the key.
    pub async fn add(&self, external_id: &str, chat_id: &str) -> Result<AddOutcome, MappingError> {
        let external_id = validate_field(external_id)?;
        let chat_id = validate_field(chat_id)?;

        let _guard = self.write_lock.lock().await;
        let mut rows = self.load_rows().await?;

        if let Some(row) = rows.iter_mut().find(|r| r.external_id == external_id) {
            row.chat_id = chat_id.to_string();
            self.rewrite(&rows).await?;
            info!(external_id, chat_id, "Replaced user mapping");
            return Ok(AddOutcome::Replaced);
        }

        self.append(external_id, chat_id).await?;
        info!(external_id, chat_id, "Added user mapping");
        Ok(AddOutcome::Added)
    }

    /// Delete the row for `external_id`. The file is untouched when the key
    /// is absent.
    pub async fn remove(&self, external_id: &str) -> Result<(), MappingError> {
        let external_id = external_id.trim();

        let _guard = self.write_lock.lock().await;
        let mut rows = self.load_rows().await?;

        let before = rows.len();
        rows.retain(|r| r.external_id != external_id);
        if rows.len() == before {
            return Err(MappingError::NotFound(external_id.to_string()));
        }

        self.rewrite(&rows).await?;
        info!(external_id, "Deleted user mapping");
        Ok(())
    }

    async fn append(&self, external_id: &str, chat_id: &str) -> Result<(), MappingError> {
        // an empty file is started over like a missing one
        let existing = match fs::read(&self.path).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(MappingError::io(&self.path, e)),
        };

        let line = encode_row(external_id, chat_id);
        let Some(existing) = existing else {
            let mut content = String::new();
            if self.header {
                content.push_str(MAPPING_HEADER);
                content.push('\n');
            }
            content.push_str(&line);
            return atomic_write(&self.path, content.as_bytes())
                .await
                .map_err(|e| MappingError::io(&self.path, e));
        };

        let mut chunk = String::new();
        if !existing.ends_with(b"\n") {
            chunk.push('\n');
        }
        chunk.push_str(&line);

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MappingError::io(&self.path, e))?;
        file.write_all(chunk.as_bytes())
            .await
            .map_err(|e| MappingError::io(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| MappingError::io(&self.path, e))?;
        Ok(())
    }

    async fn rewrite(&self, rows: &[UserMapping]) -> Result<(), MappingError> {
        let mut content = String::new();
        if self.header {
            content.push_str(MAPPING_HEADER);
            content.push('\n');
        }
        for row in rows {
            content.push_str(&encode_row(&row.external_id, &row.chat_id));
        }

        atomic_write(&self.path, content.as_bytes())
            .await
            .map_err(|e| MappingError::io(&self.path, e))
    }
}

fn validate_field(value: &str) -> Result<&str, MappingError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MappingError::Invalid("user id is empty".to_string()));
    }
    if value.contains(['\n', '\r']) {
        return Err(MappingError::Invalid(format!(
            "user id contains a line break: {:?}",
            value
        )));
    }
    Ok(value)
}

fn is_header(first: &str, second: &str) -> bool {
    let mut expected = MAPPING_HEADER.split(',');
    expected.next() == Some(first) && expected.next() == Some(second)
}

/// Quote a CSV field when it contains a separator, quote or line break.
fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_row(external_id: &str, chat_id: &str) -> String {
    format!("{},{}\n", encode_field(external_id), encode_field(chat_id))
}

/// Split CSV content into records, honoring `"`-quoted fields.
fn parse_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

/// Write `content` to a temp file beside `path`, then rename it into place.
async fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if !parent.exists() {
        fs::create_dir_all(&parent).await?;
    }

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("mapping"),
        std::process::id()
    ));

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    #[cfg(unix)]
    {
        if let Ok(dir) = std::fs::File::open(&parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, header: bool) -> UserMappingStore {
        UserMappingStore::new(dir.path().join("user_mapping.csv"), header)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);

        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(store.lookup("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_then_reload() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);

        assert_eq!(store.add("u1", "slack-U1").await.unwrap(), AddOutcome::Added);

        let reopened = store_in(&dir, false);
        assert_eq!(
            reopened.lookup("u1").await.unwrap().as_deref(),
            Some("slack-U1")
        );
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "u1,slack-U1\n");
    }

    #[tokio::test]
    async fn test_add_existing_key_replaces() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);

        store.add("u1", "slack-A").await.unwrap();
        store.add("u2", "slack-B").await.unwrap();
        assert_eq!(store.add("u1", "slack-C").await.unwrap(), AddOutcome::Replaced);

        let rows = store.load_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].chat_id, "slack-C");
        assert_eq!(rows[1].external_id, "u2");
    }

    #[tokio::test]
    async fn test_add_then_delete_leaves_no_row() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);

        store.add("alice", "slack-A").await.unwrap();
        store.add("bob", "slack-B").await.unwrap();
        store.remove("bob").await.unwrap();

        assert_eq!(store.lookup("bob").await.unwrap(), None);
        let rows = store.load_rows().await.unwrap();
        assert_eq!(
            rows,
            vec![UserMapping {
                external_id: "alice".to_string(),
                chat_id: "slack-A".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_remove_missing_key_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);
        std::fs::write(store.path(), "u1,slack-U1").unwrap();

        let err = store.remove("ghost").await.unwrap_err();
        assert!(matches!(err, MappingError::NotFound(ref key) if key == "ghost"));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "u1,slack-U1");
    }

    #[tokio::test]
    async fn test_header_after_leading_blank_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, true);
        std::fs::write(store.path(), "\nexternal_user_id,chat_user_id\nu1,s1\n").unwrap();

        let table = store.load().await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("external_user_id"), None);
        assert_eq!(table.get("u1"), Some("s1"));
    }

    #[tokio::test]
    async fn test_add_to_empty_file_writes_header() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, true);
        std::fs::write(store.path(), "").unwrap();

        assert_eq!(store.add("u1", "s1").await.unwrap(), AddOutcome::Added);
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "external_user_id,chat_user_id\nu1,s1\n"
        );
    }

    #[tokio::test]
    async fn test_append_after_unterminated_line() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);
        std::fs::write(store.path(), "u1,slack-U1").unwrap();

        store.add("u2", "slack-U2").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "u1,slack-U1\nu2,slack-U2\n"
        );
    }

    #[tokio::test]
    async fn test_header_mode() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, true);

        store.add("u1", "slack-U1").await.unwrap();
        store.add("u2", "slack-U2").await.unwrap();
        store.remove("u1").await.unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, format!("{}\nu2,slack-U2\n", MAPPING_HEADER));
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_skips_blank_and_short_rows() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);
        std::fs::write(
            store.path(),
            "external_user_id,chat_user_id\n\nu1,slack-U1\nbroken\n u2 , slack-U2 \r\n",
        )
        .unwrap();

        let table = store.load().await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("u2"), Some("slack-U2"));
        assert_eq!(table.get("broken"), None);
    }

    #[tokio::test]
    async fn test_quoted_fields_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);

        store.add("odd,\"id\"", "slack-X").await.unwrap();
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "\"odd,\"\"id\"\"\",slack-X\n");
        assert_eq!(
            store.lookup("odd,\"id\"").await.unwrap().as_deref(),
            Some("slack-X")
        );
    }

    #[tokio::test]
    async fn test_rejects_empty_ids() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, false);

        assert!(matches!(
            store.add("  ", "slack-U1").await,
            Err(MappingError::Invalid(_))
        ));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_writers_are_serialized() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir, false));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add(&format!("u{i}"), &format!("slack-{i}")).await.unwrap();
                if i % 2 == 0 {
                    store.remove(&format!("u{i}")).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let table = store.load().await.unwrap();
        assert_eq!(table.len(), 10);
        for i in (1..20).step_by(2) {
            assert_eq!(table.get(&format!("u{i}")), Some(format!("slack-{i}").as_str()));
        }
    }

    #[test]
    fn test_parse_records() {
        let records = parse_records("a,b\n\"c,d\",\"e \"\"q\"\"\"\nlast,row");
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c,d".to_string(), "e \"q\"".to_string()],
                vec!["last".to_string(), "row".to_string()],
            ]
        );
        assert!(parse_records("").is_empty());
    }
}
