//! The scheduling collaborator sockets suspend on.
//!
//! A socket never blocks and never polls the OS itself: whenever a syscall
//! would block it asks its [`Scheduler`] to park the current task until the
//! descriptor is ready, then retries. The runtime's [`Handle`](crate::Handle)
//! is the production implementation; tests may inject their own.

use crate::error::Result;

use std::future::Future;
use std::io;
use std::os::fd::RawFd;

/// Readiness, cancellation and thread off-load hooks used by sockets.
pub trait Scheduler: Clone + Send + Sync + 'static {
    /// Fails with [`Error::Cancelled`](crate::Error::Cancelled) if the
    /// current task has been cancelled.
    fn check_cancelled(&self) -> Result<()>;

    /// Suspends until `fd` is readable.
    ///
    /// Interest must be registered by the time this returns: sockets call
    /// it while holding their state lock, and a later
    /// [`notify_close`](Self::notify_close) of `fd` has to fail the wait.
    ///
    /// Resolves with [`Error::ClosedResource`](crate::Error::ClosedResource)
    /// when the descriptor is closed meanwhile, and with
    /// [`Error::Cancelled`](crate::Error::Cancelled) when the task is.
    fn wait_readable(&self, fd: RawFd) -> impl Future<Output = Result<()>> + Send;

    /// Suspends until `fd` is writable. Same failure modes as
    /// [`wait_readable`](Self::wait_readable).
    fn wait_writable(&self, fd: RawFd) -> impl Future<Output = Result<()>> + Send;

    /// Forgets every registration of `fd` and wakes its waiters with
    /// [`Error::ClosedResource`](crate::Error::ClosedResource).
    ///
    /// Called right before the descriptor is released.
    fn notify_close(&self, fd: RawFd) -> impl Future<Output = ()> + Send;

    /// Runs a blocking call off the scheduling threads and resumes the
    /// current task with its result.
    fn run_in_thread<F, T>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static;
}
