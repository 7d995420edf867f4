use crate::error::{Error, Result};
use crate::reactor::command::Command;
use crate::reactor::future::Readiness;
use crate::reactor::{Interest, ReactorHandle};
use crate::runtime::blocking;
use crate::runtime::context::{self, CURRENT_REACTOR};
use crate::scheduler::Scheduler;

use std::future::{self, Future};
use std::io;
use std::os::fd::RawFd;

/// Handle to a running runtime's reactor.
///
/// This is the runtime's [`Scheduler`]: sockets created inside a runtime
/// capture one and use it for every suspension.
#[derive(Clone)]
pub struct Handle {
    reactor: ReactorHandle,
}

impl Handle {
    pub(crate) fn new(reactor: ReactorHandle) -> Self {
        Self { reactor }
    }

    /// Returns the handle of the runtime driving the current thread.
    ///
    /// # Panics
    ///
    /// Panics when called outside a runtime worker thread.
    pub fn current() -> Self {
        match Self::try_current() {
            Some(handle) => handle,
            None => panic!("Handle::current must be called within the context of a runtime"),
        }
    }

    /// Returns the current runtime's handle, if any.
    pub fn try_current() -> Option<Self> {
        CURRENT_REACTOR.with(|r| r.borrow().clone().map(Self::new))
    }

    fn wait(&self, fd: RawFd, interest: Interest) -> Readiness {
        Readiness::new(&self.reactor, fd, interest)
    }
}

impl Scheduler for Handle {
    fn check_cancelled(&self) -> Result<()> {
        if context::is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn wait_readable(&self, fd: RawFd) -> impl Future<Output = Result<()>> + Send {
        self.wait(fd, Interest::READ)
    }

    fn wait_writable(&self, fd: RawFd) -> impl Future<Output = Result<()>> + Send {
        self.wait(fd, Interest::WRITE)
    }

    fn notify_close(&self, fd: RawFd) -> impl Future<Output = ()> + Send {
        // Commands are handled in order, so the reactor forgets `fd` before
        // any registration of a descriptor that later reuses the number.
        if self.reactor.send(Command::Close { fd }).is_err() {
            tracing::trace!(fd, "reactor gone; nothing to notify");
        }

        future::ready(())
    }

    fn run_in_thread<F, T>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        blocking::run_in_thread(f)
    }
}
