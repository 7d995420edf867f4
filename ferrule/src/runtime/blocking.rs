use crate::error::{Error, Result};
use crate::runtime::context;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};
use std::thread;

type Outcome<T> = thread::Result<io::Result<T>>;

struct Shared<T> {
    outcome: Option<Outcome<T>>,
    waker: Option<Waker>,
}

/// Future returned by [`run_in_thread`].
pub(crate) struct Blocking<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

/// Runs a blocking closure on a dedicated OS thread.
///
/// The calling task is suspended until the closure returns. Cancelling the
/// task resolves the future with [`Error::Cancelled`]; the closure still
/// runs to completion on its thread and its result is discarded.
pub(crate) fn run_in_thread<F, T>(f: F) -> Blocking<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let shared = Arc::new(Mutex::new(Shared {
        outcome: None,
        waker: None,
    }));

    let remote = shared.clone();
    let spawned = thread::Builder::new()
        .name("ferrule-blocking".into())
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));

            let waker = {
                let mut shared = remote.lock().unwrap_or_else(PoisonError::into_inner);
                shared.outcome = Some(outcome);
                shared.waker.take()
            };

            if let Some(waker) = waker {
                waker.wake();
            }
        });

    if let Err(err) = spawned {
        shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome = Some(Ok(Err(err)));
    }

    Blocking { shared }
}

impl<T> Future for Blocking<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);

        match shared.outcome.take() {
            Some(Ok(result)) => Poll::Ready(result.map_err(Error::Io)),
            Some(Err(payload)) => {
                drop(shared);
                panic::resume_unwind(payload)
            }
            None if context::is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            None => {
                shared.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
