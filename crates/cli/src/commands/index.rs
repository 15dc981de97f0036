use souq_core::retrieval::IndexLoad;

use crate::commands::{
    async_runtime, load_config, retrieval_service, CommandResult, EXIT_RETRIEVAL,
};

/// Loads the persisted index (or rebuilds it when stale). `rebuild` forces a full re-embed.
pub fn run(rebuild: bool) -> CommandResult {
    let config = match load_config("index") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("index") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let service = match retrieval_service("index", &config) {
        Ok(service) => service,
        Err(failure) => return failure,
    };

    let snapshot = runtime.block_on(async {
        if rebuild {
            service.rebuild().await
        } else {
            service.get_index().await
        }
    });

    match snapshot {
        Ok(snapshot) => {
            let how = match snapshot.load() {
                IndexLoad::Loaded => "loaded".to_string(),
                IndexLoad::Rebuilt(reason) => format!("rebuilt ({})", reason.code()),
            };
            tracing::info!(
                event_name = "cli.index.ready",
                correlation_id = "cli",
                forced = rebuild,
                catalog_entries = snapshot.catalog().len(),
                "index ready"
            );
            CommandResult::success(
                "index",
                format!(
                    "index {how}: {} catalog entries, {} vectors of dimension {} at `{}`",
                    snapshot.catalog().len(),
                    snapshot.index().count(),
                    snapshot.index().dimension(),
                    config.index.path.display()
                ),
            )
        }
        Err(error) => CommandResult::from_application_error("index", error.into(), EXIT_RETRIEVAL),
    }
}
