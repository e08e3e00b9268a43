use std::fmt::{Debug, Display};
use std::future::Future;
use tracing::error;

/// Result of a side channel whose failure must never reach the caller.
/// There is no error variant to propagate: failures are logged and become
/// `Absorbed`.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Completed,
    Absorbed,
}

impl SideEffect {
    pub fn is_completed(self) -> bool {
        self == SideEffect::Completed
    }
}

/// Runs `work` to completion and converts any error into `Absorbed`, logging
/// it together with the parameters the work was started with.
pub async fn absorb<F, E, P>(operation: &'static str, params: &P, work: F) -> SideEffect
where
    F: Future<Output = Result<(), E>>,
    E: Display,
    P: Debug + ?Sized,
{
    match work.await {
        Ok(()) => SideEffect::Completed,
        Err(e) => {
            error!(operation, error = %e, params = ?params, "Best-effort operation failed; continuing.");
            SideEffect::Absorbed
        }
    }
}
