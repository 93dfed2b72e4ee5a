//! Cancellation and deadlines for a single retrieval call.
//!
//! A [`CallContext`] pairs a [`CancellationToken`] with an optional
//! deadline. Long-running work checks it between steps with
//! [`CallContext::check`] and wraps collaborator calls in
//! [`CallContext::run`], which abandons the future as soon as the call is
//! cancelled or runs out of time.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RetrievalError;

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that never expires and is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Tie this context to an existing token (e.g. one shared with a Ctrl-C handler).
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fail fast if the call was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), RetrievalError> {
        if self.token.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(RetrievalError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the call is cancelled or expires first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, RetrievalError>
    where
        F: Future,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(RetrievalError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Err(RetrievalError::DeadlineExceeded),
                out = fut => Ok(out),
            },
            None => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(RetrievalError::Cancelled),
                out = fut => Ok(out),
            },
        }
    }
}
