use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Error, Result};

/// Per-call cancellation scope. Every gateway round trip made on behalf of a call runs under the
/// context's deadline; once it passes the call fails with [`Error::DeadlineExceeded`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
}

impl CallContext {
    /// No deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The earlier of this context's deadline and `now + timeout`.
    #[must_use]
    pub fn tightened(self, timeout: Option<Duration>) -> Self {
        let Some(timeout) = timeout else {
            return self;
        };
        let candidate = Instant::now() + timeout;
        Self {
            deadline: Some(self.deadline.map_or(candidate, |current| current.min(candidate))),
        }
    }

    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_expired() {
            return Err(Error::DeadlineExceeded);
        }
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| Error::DeadlineExceeded)?,
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_deadline_cancels_the_call() {
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(ctx.is_expired());
    }

    #[tokio::test]
    async fn expired_context_does_not_start_the_call() {
        let ctx = CallContext::with_deadline(Instant::now());
        let started = std::sync::atomic::AtomicBool::new(false);
        let result = ctx
            .run(async {
                started.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(!started.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn background_context_never_expires() {
        let ctx = CallContext::background();
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
        assert!(!ctx.is_expired());
    }

    #[test]
    fn tightened_keeps_the_earlier_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1));
        let original = ctx.deadline().unwrap();
        assert_eq!(ctx.tightened(Some(Duration::from_secs(60))).deadline(), Some(original));
        assert!(ctx.tightened(Some(Duration::from_millis(1))).deadline().unwrap() < original);
        assert!(CallContext::background()
            .tightened(Some(Duration::from_secs(1)))
            .deadline()
            .is_some());
    }
}
