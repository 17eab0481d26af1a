//! # Cancellation
//!
//! Each invocation gets one [`CancellationController`]. Its deadline is the
//! execution timeout; the controller can also fire early (host shutdown).
//! Capability modules hold a [`CancelToken`] and race every blocking call
//! against it.
//!
//! Cancellation is cooperative. It is observed only where a module awaits,
//! so a guest spinning in pure Lua is not interrupted by it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Returned by [`CancelToken::race`] when the token fires first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution cancelled: deadline exceeded")]
pub struct Cancelled;

/// Owner side of an invocation's cancellation signal
#[derive(Debug)]
pub struct CancellationController {
    deadline: Instant,
    tx: watch::Sender<bool>,
}

impl CancellationController {
    /// Controller that fires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { deadline, tx }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Fire immediately
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            deadline: self.deadline,
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side, cloned into every module binding of one invocation
#[derive(Debug, Clone)]
pub struct CancelToken {
    deadline: Instant,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || Instant::now() >= self.deadline
    }

    /// Resolves once the deadline passes or the controller fires
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);

        loop {
            if *rx.borrow_and_update() {
                return;
            }
            tokio::select! {
                _ = &mut deadline => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Controller dropped; only the deadline remains
                        (&mut deadline).await;
                        return;
                    }
                }
            }
        }
    }

    /// Run `fut` unless cancellation comes first
    pub async fn race<F, T>(&self, fut: F) -> Result<T, Cancelled>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            value = fut => Ok(value),
        }
    }

    /// Sleep for `duration`, returning early with `Cancelled`
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.race(tokio::time::sleep(duration)).await
    }
}
