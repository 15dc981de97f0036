use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// One transcribed voice message. Written for observability only; nothing in the
/// conversation pipeline reads it back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub user: String,
    pub text: String,
}

impl TranscriptRecord {
    pub fn new(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self { user: user.into(), text: text.into() }
    }
}

#[derive(Debug, Error)]
pub enum TranscriptLogError {
    #[error("transcript log io failure at `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("transcript log line {line} is not a valid record: {message}")]
    Decode { line: usize, message: String },
    #[error("transcript log storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait TranscriptLog: Send + Sync {
    async fn append(&self, record: &TranscriptRecord) -> Result<(), TranscriptLogError>;

    /// Latest `limit` records, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<TranscriptRecord>, TranscriptLogError>;
}

/// Append-only JSON lines file, one `{"user":..,"text":..}` object per line.
#[derive(Debug)]
pub struct JsonlTranscriptLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTranscriptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> TranscriptLogError {
        TranscriptLogError::Io { path: self.path.clone(), source }
    }
}

#[async_trait]
impl TranscriptLog for JsonlTranscriptLog {
    async fn append(&self, record: &TranscriptRecord) -> Result<(), TranscriptLogError> {
        let mut line = serde_json::to_string(record)
            .map_err(|error| TranscriptLogError::Storage(error.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|error| self.io_error(error))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|error| self.io_error(error))?;
        file.write_all(line.as_bytes()).await.map_err(|error| self.io_error(error))?;
        file.flush().await.map_err(|error| self.io_error(error))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TranscriptRecord>, TranscriptLogError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(self.io_error(error)),
        };

        let records = raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<TranscriptRecord>(line).map_err(|error| {
                    TranscriptLogError::Decode { line: index + 1, message: error.to_string() }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let skip = records.len().saturating_sub(limit);
        Ok(records.into_iter().skip(skip).collect())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryTranscriptLog {
    records: Arc<RwLock<Vec<TranscriptRecord>>>,
}

impl InMemoryTranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl TranscriptLog for InMemoryTranscriptLog {
    async fn append(&self, record: &TranscriptRecord) -> Result<(), TranscriptLogError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TranscriptRecord>, TranscriptLogError> {
        let records = self.records.read().await;
        let skip = records.len().saturating_sub(limit);
        Ok(records.iter().skip(skip).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{
        InMemoryTranscriptLog, JsonlTranscriptLog, TranscriptLog, TranscriptLogError,
        TranscriptRecord,
    };

    #[tokio::test]
    async fn jsonl_log_appends_one_object_per_line() {
        let dir = TempDir::new().expect("tempdir");
        let log = JsonlTranscriptLog::new(dir.path().join("logs/transcripts.jsonl"));

        log.append(&TranscriptRecord::new("whatsapp:+1", "show me shoes")).await.expect("append");
        log.append(&TranscriptRecord::new("whatsapp:+2", "أريد حذاء")).await.expect("append");

        let raw = std::fs::read_to_string(log.path()).expect("read");
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"user":"whatsapp:+1","text":"show me shoes"}"#);

        let recent = log.recent(1).await.expect("recent");
        assert_eq!(recent, vec![TranscriptRecord::new("whatsapp:+2", "أريد حذاء")]);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_and_bad_lines_are_reported() {
        let dir = TempDir::new().expect("tempdir");
        let log = JsonlTranscriptLog::new(dir.path().join("transcripts.jsonl"));
        assert!(log.recent(50).await.expect("recent").is_empty());

        std::fs::write(log.path(), "{\"user\":\"u\",\"text\":\"t\"}\nnot json\n").expect("write");
        let error = log.recent(50).await.expect_err("decode failure");
        assert!(matches!(error, TranscriptLogError::Decode { line: 2, .. }));
    }

    #[tokio::test]
    async fn in_memory_log_keeps_order() {
        let log = InMemoryTranscriptLog::new();
        for index in 0..5 {
            let record = TranscriptRecord::new("u", format!("message {index}"));
            log.append(&record).await.expect("append");
        }

        let recent = log.recent(2).await.expect("recent");
        let texts: Vec<_> = recent.iter().map(|record| record.text.as_str()).collect();
        assert_eq!(texts, vec!["message 3", "message 4"]);
        assert_eq!(log.len().await, 5);
    }
}
