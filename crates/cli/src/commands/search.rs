use souq_core::{ApplicationError, CatalogEntry};

use crate::commands::{
    async_runtime, load_config, retrieval_service, CommandResult, EXIT_INVALID_INPUT,
    EXIT_RETRIEVAL,
};

pub fn run(query: &str, top_k: Option<usize>) -> CommandResult {
    if query.trim().is_empty() {
        return CommandResult::from_application_error(
            "search",
            ApplicationError::InvalidInput("search query must not be blank".to_string()),
            EXIT_INVALID_INPUT,
        );
    }

    let config = match load_config("search") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("search") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let service = match retrieval_service("search", &config) {
        Ok(service) => service,
        Err(failure) => return failure,
    };

    let top_k = top_k.unwrap_or(config.index.top_k);
    match runtime.block_on(service.search(query.trim(), top_k)) {
        Ok(results) if results.is_empty() => CommandResult::success("search", "no matches"),
        Ok(results) => CommandResult::success("search", render_results(&results)),
        Err(error) => {
            CommandResult::from_application_error("search", error.into(), EXIT_RETRIEVAL)
        }
    }
}

fn render_results(results: &[CatalogEntry]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let price = entry
                .price
                .map(|price| format!("{price} {}", entry.currency))
                .unwrap_or_else(|| "no price".to_string());
            format!(
                "{}. {} [{} {}] {price}",
                position + 1,
                entry.display_name,
                entry.product_id.0,
                entry.language
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
