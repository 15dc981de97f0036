use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    SingleTurnRecommendation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    ClassifyIntent,
    ExtractQuery,
    Retrieve,
    ComposeRecommendation,
    ComposeGreeting,
    End,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::ClassifyIntent => "classify_intent",
            Self::ExtractQuery => "extract_query",
            Self::Retrieve => "retrieve",
            Self::ComposeRecommendation => "compose_recommendation",
            Self::ComposeGreeting => "compose_greeting",
            Self::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// Outcome of the router after intent classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Greeting,
    Recommendation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Timeout,
    CollaboratorError,
    EmptyOutput,
    AmbiguousOutput,
    PipelineError,
}

impl FallbackReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::CollaboratorError => "collaborator_error",
            Self::EmptyOutput => "empty_output",
            Self::AmbiguousOutput => "ambiguous_output",
            Self::PipelineError => "pipeline_error",
        }
    }
}

/// A stage that substituted its fallback value instead of the collaborator's output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFallback {
    pub stage: Stage,
    pub reason: FallbackReason,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: Stage,
    pub to: Stage,
    pub route: Option<Route>,
}
