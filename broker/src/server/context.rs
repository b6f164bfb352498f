use std::future::{pending, Future};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Why a request context is done
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline scope shared by every stage of one request.
///
/// Cloning is cheap; all clones observe the same cancellation signal.
#[derive(Clone, Debug)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
}

/// Cancels the [`RequestContext`] it was created with, explicitly or on drop.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl RequestContext {
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        let (sender, cancelled) = watch::channel(false);
        (
            Self {
                deadline: Some(Instant::now() + timeout),
                cancelled,
            },
            CancelHandle { sender },
        )
    }

    /// A context with no deadline that is never cancelled.
    #[cfg(test)]
    pub fn background() -> Self {
        let (sender, cancelled) = watch::channel(false);
        // Receivers keep the last value once the sender is gone.
        drop(sender);
        Self {
            deadline: None,
            cancelled,
        }
    }

    /// Returns the reason the context is done, or `None` while it is live.
    pub fn err(&self) -> Option<ContextError> {
        if *self.cancelled.borrow() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        let mut cancelled = self.cancelled.clone();
        let on_cancel = async move {
            loop {
                if *cancelled.borrow_and_update() {
                    return;
                }
                if cancelled.changed().await.is_err() {
                    // Sender dropped without cancelling: never fires.
                    pending::<()>().await;
                }
            }
        };
        let on_deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            _ = on_cancel => ContextError::Cancelled,
            _ = on_deadline => ContextError::DeadlineExceeded,
        }
    }

    /// Drives `fut` to completion unless the context finishes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ContextError>
    where
        F: Future<Output = T>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            value = fut => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_never_done() {
        let ctx = RequestContext::background();
        assert!(ctx.err().is_none());
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_work() {
        let (ctx, handle) = RequestContext::with_timeout(Duration::from_secs(30));
        let worker = ctx.clone();
        let task = tokio::spawn(async move { worker.run(pending::<()>()).await });

        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(ContextError::Cancelled));
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let (ctx, handle) = RequestContext::with_timeout(Duration::from_secs(30));
        assert!(ctx.err().is_none());
        drop(handle);
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let (ctx, _handle) = RequestContext::with_timeout(Duration::from_millis(20));
        let result = ctx.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_future() {
        let (ctx, handle) = RequestContext::with_timeout(Duration::from_secs(30));
        handle.cancel();
        let result = ctx.run(async { panic!("must not be polled") }).await;
        assert_eq!(result, Err(ContextError::Cancelled));
    }
}
