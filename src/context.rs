//! Per-request context: the deadline and actor attached to a session's action.

use crate::error::{BoardError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub deadline: Option<Instant>,
    pub actor: Option<String>,
}

impl RequestContext {
    /// A context with no deadline and no actor
    pub fn background() -> Self {
        Self::default()
    }

    /// Sets the deadline to `timeout` from now, keeping an earlier existing deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn actor(&self) -> &str {
        self.actor.as_deref().unwrap_or("anonymous")
    }

    /// The earlier of this context's deadline and `now + limit`.
    pub fn effective_deadline(&self, limit: Duration) -> Instant {
        let local = Instant::now() + limit;
        match self.deadline {
            Some(deadline) if deadline < local => deadline,
            _ => local,
        }
    }

    /// Runs a repository call under the effective deadline.
    pub async fn run<T, F>(&self, operation: &'static str, limit: Duration, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(self.effective_deadline(limit), call).await {
            Ok(result) => result,
            Err(_) => Err(BoardError::Timeout { operation }),
        }
    }
}
