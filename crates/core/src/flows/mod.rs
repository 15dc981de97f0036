pub mod engine;
pub mod states;

pub use engine::{route, ConversationFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{FallbackReason, FlowType, Route, Stage, StageFallback, TransitionOutcome};
