//! Cancellation context for a call.
//!
//! A [`Context`] carries a cancellation signal and an optional deadline. The
//! execution loop races the network call and every backoff wait against it,
//! and the multipart producer's completion wait does the same.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Error;

/// Cancellation signal plus optional deadline.
///
/// Clones share the same signal: cancelling any clone cancels all of them.
/// Contexts derived with [`Context::with_timeout`] share the signal as well
/// and only tighten the deadline.
#[derive(Debug, Clone)]
pub struct Context {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    notify: watch::Sender<bool>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline until
    /// [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn background() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared { notify }),
            deadline: None,
        }
    }

    /// Derives a context whose deadline is `timeout` from now (or the
    /// current deadline, if that is earlier).
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context with the given deadline (or the current deadline,
    /// if that is earlier).
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            shared: Arc::clone(&self.shared),
            deadline: Some(deadline),
        }
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels the context and every clone of it.
    pub fn cancel(&self) {
        self.shared.notify.send_replace(true);
    }

    /// Check if cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.shared.notify.borrow()
    }

    /// Returns the context error if the context is already done.
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        if self.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes,
    /// yielding the matching error.
    pub async fn done(&self) -> Error {
        let mut watcher = self.shared.notify.subscribe();
        let cancelled = async move {
            loop {
                if *watcher.borrow_and_update() {
                    return;
                }
                if watcher.changed().await.is_err() {
                    // Sender lives as long as `self`; nothing left to wait for.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                () = cancelled => Error::Cancelled,
                () = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                Error::Cancelled
            }
        }
    }

    /// Runs `future` unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::DeadlineExceeded`] when the
    /// context is done before (or while) the future runs.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Error> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = future => Ok(output),
        }
    }
}
