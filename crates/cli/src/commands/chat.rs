use std::sync::Arc;

use souq_agent::{AgentRuntime, AgentSettings, Collaborators};
use souq_core::{ApplicationError, Language};

use crate::commands::{
    async_runtime, load_config, retrieval_service, CommandResult, EXIT_CONFIG,
    EXIT_INVALID_INPUT, EXIT_RETRIEVAL,
};

/// Runs one message through the same pipeline the webhook uses, minus transcription.
pub fn run(text: &str, user: &str, language: Option<&str>) -> CommandResult {
    if text.trim().is_empty() {
        return CommandResult::from_application_error(
            "chat",
            ApplicationError::InvalidInput("message text must not be blank".to_string()),
            EXIT_INVALID_INPUT,
        );
    }

    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let retrieval = match retrieval_service("chat", &config) {
        Ok(service) => Arc::new(service),
        Err(failure) => return failure,
    };

    if let Err(error) = runtime.block_on(retrieval.get_index()) {
        return CommandResult::from_application_error("chat", error.into(), EXIT_RETRIEVAL);
    }

    let collaborators = match Collaborators::from_config(&config, retrieval) {
        Ok(collaborators) => collaborators,
        Err(error) => {
            return CommandResult::failure("chat", "integration", format!("{error:#}"), EXIT_CONFIG)
        }
    };
    let agent = AgentRuntime::new(collaborators, AgentSettings::from_config(&config));
    let language = language.map(Language::from_code);

    let reply = runtime.block_on(agent.run_message(user, text.trim(), language));
    CommandResult::success("chat", reply)
}
