use souq_core::config::TranscriptStore;
use souq_core::transcripts::JsonlTranscriptLog;
use souq_core::{ApplicationError, TranscriptLog, TranscriptRecord};
use souq_db::{connect_with_settings, SqlTranscriptLog};

use crate::commands::{
    async_runtime, load_config, CommandResult, EXIT_DB_CONNECT, EXIT_TRANSCRIPTS,
};

pub fn run(limit: usize) -> CommandResult {
    let config = match load_config("transcripts") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("transcripts") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let records = runtime.block_on(async {
        match config.storage.transcripts {
            TranscriptStore::Jsonl => JsonlTranscriptLog::new(&config.storage.transcript_path)
                .recent(limit)
                .await
                .map_err(|error| {
                    CommandResult::from_application_error(
                        "transcripts",
                        error.into(),
                        EXIT_TRANSCRIPTS,
                    )
                }),
            TranscriptStore::Sqlite => {
                let pool = connect_with_settings(
                    &config.storage.database_url,
                    config.storage.max_connections,
                    config.storage.timeout_secs,
                )
                .await
                .map_err(|error| {
                    CommandResult::failure(
                        "transcripts",
                        "db_connectivity",
                        error.to_string(),
                        EXIT_DB_CONNECT,
                    )
                })?;
                let log = SqlTranscriptLog::new(pool.clone());
                let records = log.recent(limit).await;
                pool.close().await;
                records.map_err(|error| {
                    CommandResult::from_application_error(
                        "transcripts",
                        ApplicationError::from(error),
                        EXIT_TRANSCRIPTS,
                    )
                })
            }
        }
    });

    match records {
        Ok(records) if records.is_empty() => {
            CommandResult::success("transcripts", "no transcripts recorded")
        }
        Ok(records) => CommandResult::success("transcripts", render(&records)),
        Err(failure) => failure,
    }
}

fn render(records: &[TranscriptRecord]) -> String {
    records
        .iter()
        .map(|record| format!("{}: {}", record.user, record.text))
        .collect::<Vec<_>>()
        .join("\n")
}
