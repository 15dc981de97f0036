use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::conversation::Intent;
use crate::flows::states::{FlowType, Route, Stage, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_stage(&self) -> Stage;
    fn transition(
        &self,
        current: Stage,
        intent: Option<Intent>,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// normalize -> classify_intent -> (greeting | extract_query -> retrieve -> recommendation) -> end
#[derive(Clone, Debug, Default)]
pub struct ConversationFlow;

impl FlowDefinition for ConversationFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::SingleTurnRecommendation
    }

    fn initial_stage(&self) -> Stage {
        Stage::Normalize
    }

    fn transition(
        &self,
        current: Stage,
        intent: Option<Intent>,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_single_turn(current, intent)
    }
}

/// Router after intent classification. A missing intent is the classifier failure
/// default and takes the recommendation path.
pub fn route(intent: Option<Intent>) -> Route {
    match intent {
        Some(Intent::Greet) | Some(Intent::Smalltalk) => Route::Greeting,
        Some(Intent::ProductRecommend) | None => Route::Recommendation,
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_stage(&self) -> Stage {
        self.flow.initial_stage()
    }

    pub fn apply(
        &self,
        current: Stage,
        intent: Option<Intent>,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, intent)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: Stage,
        intent: Option<Intent>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, intent);
        match &result {
            Ok(outcome) => {
                let mut event = audit
                    .event("flow.transition_applied", AuditCategory::Stage, AuditOutcome::Success)
                    .with_metadata("from", outcome.from.name())
                    .with_metadata("to", outcome.to.name());
                if let Some(route) = outcome.route {
                    event = event.with_metadata("route", format!("{route:?}"));
                }
                sink.emit(event);
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event(
                            "flow.transition_rejected",
                            AuditCategory::Stage,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    /// Stages visited from the initial stage to `End` for a given classification.
    pub fn path(&self, intent: Option<Intent>) -> Result<Vec<Stage>, FlowTransitionError> {
        let mut stage = self.initial_stage();
        let mut path = vec![stage];
        while !stage.is_terminal() {
            stage = self.apply(stage, intent)?.to;
            path.push(stage);
        }
        Ok(path)
    }
}

impl Default for FlowEngine<ConversationFlow> {
    fn default() -> Self {
        Self::new(ConversationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("no transition out of terminal stage {stage:?}")]
    TerminalStage { stage: Stage },
}

fn transition_single_turn(
    current: Stage,
    intent: Option<Intent>,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use Stage::{
        ClassifyIntent, ComposeGreeting, ComposeRecommendation, End, ExtractQuery, Normalize,
        Retrieve,
    };

    let (to, route) = match current {
        Normalize => (ClassifyIntent, None),
        ClassifyIntent => match route(intent) {
            Route::Greeting => (ComposeGreeting, Some(Route::Greeting)),
            Route::Recommendation => (ExtractQuery, Some(Route::Recommendation)),
        },
        ExtractQuery => (Retrieve, None),
        Retrieve => (ComposeRecommendation, None),
        ComposeRecommendation | ComposeGreeting => (End, None),
        End => return Err(FlowTransitionError::TerminalStage { stage: current }),
    };

    Ok(TransitionOutcome { from: current, to, route })
}
