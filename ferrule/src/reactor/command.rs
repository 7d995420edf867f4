use super::io::Waiter;
use super::poller::common::Interest;

use std::os::fd::RawFd;
use std::sync::Arc;

/// Requests sent from tasks to the reactor thread.
pub(crate) enum Command {
    /// Wake `waiter` once `fd` is ready for `interest`.
    Register {
        fd: RawFd,
        interest: Interest,
        waiter: Arc<Waiter>,
    },

    /// `fd` is about to be closed: forget it and fail its waiters.
    Close { fd: RawFd },

    /// Stop the reactor thread.
    Shutdown,
}
