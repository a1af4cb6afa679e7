use std::future::Future;
use tracing::{debug, warn};

use crate::errors::{Stage, TriageError, TriageResult};

/// Run `work` against each candidate in order until one succeeds.
///
/// The first candidate is the primary, the rest are substitutes. Candidates after
/// the first success are never touched, and there is no delay between attempts.
/// When every candidate fails the last error is returned inside
/// [`TriageError::FallbackExhausted`] tagged with `stage`.
pub async fn with_fallback<C, T, F, Fut>(
    stage: Stage,
    candidates: &[C],
    mut work: F,
) -> TriageResult<T>
where
    F: FnMut(&C) -> Fut,
    Fut: Future<Output = TriageResult<T>>,
{
    let mut last_error = None;

    for (attempt, candidate) in candidates.iter().enumerate() {
        match work(candidate).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(target: "triage::fallback", %stage, attempt, "substitute succeeded");
                }
                return Ok(value);
            }
            Err(err) => {
                warn!(target: "triage::fallback", %stage, attempt, error = %err, "candidate failed");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(source) => Err(TriageError::FallbackExhausted {
            stage,
            attempts: candidates.len(),
            source: Box::new(source),
        }),
        None => Err(TriageError::InvalidParameters(format!(
            "no candidates configured for {}",
            stage
        ))),
    }
}
