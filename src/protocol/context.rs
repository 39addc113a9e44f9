//! Cancellation and deadline propagation for calls and servers

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;

/// Cancellation signal plus optional deadline. Derived contexts are cancelled
/// together with their parent.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Keeps whichever of the parent's deadline and `deadline` comes first.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Runs `operation` bounded by this context: cancellation yields
    /// [`TransportError::Cancelled`], an expired deadline yields
    /// [`TransportError::DeadlineExceeded`].
    pub async fn bound<F, T>(&self, operation: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        if self.token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let timed = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, operation)
                    .await
                    .unwrap_or(Err(TransportError::DeadlineExceeded)),
                None => operation.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TransportError::Cancelled),
            result = timed => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_is_cancelled_with_parent() {
        let parent = CallContext::background();
        let child = parent.child();

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn cancelling_child_leaves_parent_running() {
        let parent = CallContext::background();
        let child = parent.with_timeout(Duration::from_secs(60));

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn earlier_deadline_wins() {
        let parent = CallContext::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn done_resolves_at_deadline() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(2), ctx.done())
            .await
            .expect("deadline should resolve done()");
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn bound_reports_deadline() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(20));

        let result = ctx
            .bound(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TransportError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn bound_reports_cancellation() {
        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = ctx
            .bound(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn bound_passes_through_results() {
        let ctx = CallContext::background().with_timeout(Duration::from_secs(5));

        let value = ctx.bound(async { Ok(7) }).await.expect("operation result");
        assert_eq!(value, 7);
    }
}
