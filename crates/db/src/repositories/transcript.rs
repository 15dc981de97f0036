use async_trait::async_trait;
use chrono::Utc;
use souq_core::{TranscriptLog, TranscriptLogError, TranscriptRecord};
use sqlx::{sqlite::SqliteRow, Row};

use super::RepositoryError;
use crate::DbPool;

/// Transcript log stored in the `transcript` table.
pub struct SqlTranscriptLog {
    pool: DbPool,
}

impl SqlTranscriptLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let row =
            sqlx::query("SELECT COUNT(*) AS count FROM transcript").fetch_one(&self.pool).await?;
        Ok(row.try_get("count")?)
    }

    async fn insert(&self, record: &TranscriptRecord) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO transcript (user_id, text, created_at) VALUES (?, ?, ?)")
            .bind(&record.user)
            .bind(&record.text)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest(&self, limit: usize) -> Result<Vec<TranscriptRecord>, RepositoryError> {
        let limit = i64::try_from(limit)
            .map_err(|_| RepositoryError::Decode(format!("limit {limit} is out of range")))?;
        let rows = sqlx::query(
            r#"
            SELECT user_id, text FROM (
                SELECT id, user_id, text FROM transcript ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TranscriptRecord, RepositoryError> {
    Ok(TranscriptRecord::new(
        row.try_get::<String, _>("user_id")?,
        row.try_get::<String, _>("text")?,
    ))
}

#[async_trait]
impl TranscriptLog for SqlTranscriptLog {
    async fn append(&self, record: &TranscriptRecord) -> Result<(), TranscriptLogError> {
        self.insert(record).await?;
        tracing::debug!(event_name = "db.transcript.appended", user_id = %record.user);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TranscriptRecord>, TranscriptLogError> {
        Ok(self.latest(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use souq_core::{TranscriptLog, TranscriptRecord};

    use super::SqlTranscriptLog;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    async fn log() -> SqlTranscriptLog {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        SqlTranscriptLog::new(pool)
    }

    #[tokio::test]
    async fn recent_returns_latest_records_oldest_first() {
        let log = log().await;
        for index in 0..5 {
            log.append(&TranscriptRecord::new("whatsapp:+1", format!("message {index}")))
                .await
                .expect("append");
        }

        let recent = log.recent(3).await.expect("recent");
        let texts: Vec<&str> = recent.iter().map(|record| record.text.as_str()).collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
        assert_eq!(log.count().await.expect("count"), 5);
    }

    #[tokio::test]
    async fn empty_table_reads_as_empty() {
        let log = log().await;
        assert!(log.recent(50).await.expect("recent").is_empty());
        assert!(log.recent(0).await.expect("recent").is_empty());
    }
}
