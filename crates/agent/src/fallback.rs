use std::future::Future;
use std::time::Duration;

use souq_core::FallbackReason;

/// Why a collaborator call did not produce a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageFailure {
    pub reason: FallbackReason,
    pub detail: String,
}

impl StageFailure {
    pub fn new(reason: FallbackReason, detail: impl Into<String>) -> Self {
        Self { reason, detail: detail.into() }
    }
}

/// Result of one stage: either the collaborator's value or the value substituted for it.
#[derive(Clone, Debug, PartialEq)]
pub enum StageOutcome<T> {
    Completed(T),
    Fallback { value: T, failure: StageFailure },
}

impl<T> StageOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Completed(value) | Self::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Completed(value) | Self::Fallback { value, .. } => value,
        }
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Fallback { failure, .. } => Some(failure),
        }
    }
}

/// Awaits a collaborator call under `limit`, folding errors and timeouts into a
/// [`StageFailure`].
pub async fn bounded<T, Fut>(limit: Duration, call: Fut) -> Result<T, StageFailure>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => {
            Err(StageFailure::new(FallbackReason::CollaboratorError, format!("{error:#}")))
        }
        Err(_) => Err(StageFailure::new(
            FallbackReason::Timeout,
            format!("no answer within {}ms", limit.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use souq_core::FallbackReason;

    use super::{bounded, StageOutcome};

    #[tokio::test]
    async fn bounded_passes_values_through() {
        let value = bounded(Duration::from_secs(1), async { Ok::<_, anyhow::Error>(7) }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn bounded_maps_errors() {
        let failure = bounded(Duration::from_secs(1), async {
            Err::<u8, _>(anyhow::anyhow!("backend down"))
        })
        .await
        .expect_err("should fail");
        assert_eq!(failure.reason, FallbackReason::CollaboratorError);
        assert!(failure.detail.contains("backend down"));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out() {
        let failure = bounded(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>(1)
        })
        .await
        .expect_err("should time out");
        assert_eq!(failure.reason, FallbackReason::Timeout);
    }

    #[test]
    fn outcome_exposes_value_and_failure() {
        let outcome = StageOutcome::Fallback {
            value: "raw".to_string(),
            failure: super::StageFailure::new(FallbackReason::EmptyOutput, "blank"),
        };
        assert_eq!(outcome.value(), "raw");
        assert_eq!(
            outcome.failure().map(|failure| failure.reason),
            Some(FallbackReason::EmptyOutput)
        );
        assert_eq!(outcome.into_value(), "raw");
    }
}
