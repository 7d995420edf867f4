use super::Task;
use super::state::COMPLETED;

use std::panic;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::task::{Context, Poll};

/// A handle to a spawned task.
///
/// A `JoinHandle` resolves to the task's output once it completes. If the
/// task panicked, awaiting the handle resumes that panic.
///
/// Dropping the `JoinHandle` does **not** cancel the task; use
/// [`cancel`](Self::cancel) for that.
pub struct JoinHandle<T> {
    /// Shared reference to the underlying task.
    pub(crate) task: Arc<Task<T>>,
}

impl<T: Send + 'static> JoinHandle<T> {
    /// Requests cancellation of the task.
    ///
    /// The task is woken; its pending and future socket operations fail
    /// with [`Error::Cancelled`](crate::Error::Cancelled). How it reacts is
    /// up to the task itself.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Returns `true` once the task has produced its output.
    pub fn is_finished(&self) -> bool {
        self.task.state.load(Ordering::Acquire) == COMPLETED
    }

    fn take_result(&self) -> Option<T> {
        let result = self
            .task
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        match result {
            Ok(value) => Some(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<T: Send + 'static> Future for JoinHandle<T> {
    type Output = T;

    /// The waker is registered **before** re-checking the state so a
    /// completion racing with this poll is never missed.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if self.is_finished() {
            if let Some(value) = self.take_result() {
                return Poll::Ready(value);
            }
        }

        self.task
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cx.waker().clone());

        if self.is_finished() {
            if let Some(value) = self.take_result() {
                return Poll::Ready(value);
            }
        }

        Poll::Pending
    }
}
