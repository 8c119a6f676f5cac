//! Cancellation plumbing shared by every network-touching call

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Start the operation built by `start` and run it unless `cancel` fires first.
///
/// `start` is not invoked at all when the token is already cancelled.
/// `what` names the operation in the resulting `Cancelled` error.
pub async fn cancellable<T, F, S>(cancel: &CancellationToken, what: &str, start: S) -> Result<T>
where
    S: FnOnce() -> F,
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::cancelled(format!("{what} not started")));
    }
    let fut = start();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(format!("{what} interrupted"))),
        result = fut => result,
    }
}

/// Sleep for `duration`, returning `false` if `cancel` fired first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
