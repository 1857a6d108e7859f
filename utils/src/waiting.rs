use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WaitError<E> {
    #[error("condition was not met within {0:?}")]
    Timeout(Duration),
    #[error("wait was cancelled")]
    Cancelled,
    #[error("{0}")]
    Condition(E),
}

/// Polls the given condition until it reports success, the timeout elapses
/// or the cancellation token fires. The condition is always checked at least
/// once; errors from the condition end the wait immediately.
pub async fn wait_until<C, F, E>(
    mut condition: C,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), WaitError<E>>
where
    C: FnMut() -> F,
    F: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await.map_err(WaitError::Condition)? {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout(timeout));
        }

        let step = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(step) => {}
        }
    }
}
