use crate::error::{Error, Result};
use crate::reactor::ReactorHandle;
use crate::reactor::command::Command;
use crate::reactor::io::{CLOSED, READY, Waiter};
use crate::reactor::poller::common::Interest;
use crate::runtime::context;

use std::future::Future;
use std::io;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Waits until a descriptor is ready for one interest.
///
/// Interest is registered when the future is created, not when it is first
/// polled, so a `Close` sent afterwards is always seen by this wait. The
/// future resolves with [`Error::ClosedResource`] if the descriptor is
/// closed meanwhile and with [`Error::Cancelled`] as soon as the owning
/// task is cancelled.
pub(crate) struct Readiness {
    /// `None` once resolved, or when the reactor was already gone.
    waiter: Option<Arc<Waiter>>,
}

impl Readiness {
    pub(crate) fn new(reactor: &ReactorHandle, fd: RawFd, interest: Interest) -> Self {
        let waiter = Arc::new(Waiter::new());

        let sent = reactor.send(Command::Register {
            fd,
            interest,
            waiter: waiter.clone(),
        });

        Self {
            waiter: sent.is_ok().then_some(waiter),
        }
    }
}

impl Future for Readiness {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if context::is_cancelled() {
            if let Some(waiter) = this.waiter.take() {
                waiter.abandon();
            }
            return Poll::Ready(Err(Error::Cancelled));
        }

        let Some(waiter) = this.waiter.as_ref() else {
            return Poll::Ready(Err(Error::Io(io::Error::other(
                "reactor is no longer running",
            ))));
        };

        // The waker goes in before the state is read, so a completion in
        // between either is seen here or finds the waker.
        waiter.set_waker(cx.waker());

        match waiter.state() {
            READY => {
                this.waiter = None;
                Poll::Ready(Ok(()))
            }
            CLOSED => {
                this.waiter = None;
                Poll::Ready(Err(Error::ClosedResource))
            }
            _ => Poll::Pending,
        }
    }
}

impl Drop for Readiness {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            waiter.abandon();
        }
    }
}
