//! Time and cancellation bounds for outbound calls.
//!
//! Every network call made on behalf of a request goes through [`bounded`]:
//! it refuses to start once the request token is cancelled, races the call
//! against the token, and caps it with a per-call timeout. A [`Deadline`]
//! cancels the request token when the overall request budget runs out.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// Why a bounded call did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("cancelled")]
    Cancelled,
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Run `fut` unless `cancel` fires first or `timeout` elapses.
pub async fn bounded<F>(
    cancel: &CancellationToken,
    timeout: Duration,
    fut: F,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    // Check before calling so a cancelled request never issues new I/O.
    if cancel.is_cancelled() {
        return Err(Interrupted::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        res = tokio::time::timeout(timeout, fut) => res.map_err(|_| Interrupted::TimedOut(timeout)),
    }
}

/// Cancels a token after a fixed budget. Dropping the guard disarms the timer.
#[derive(Debug)]
pub struct Deadline {
    timer: AbortHandle,
}

impl Deadline {
    /// Arm a timer that cancels `token` after `after`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(token: CancellationToken, after: Duration) -> Self {
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tracing::debug!(?after, "request deadline reached; cancelling");
            token.cancel();
        })
        .abort_handle();
        Self { timer }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
