use std::os::fd::RawFd;

/// Readiness reported by the poller for one descriptor.
///
/// Errors and hang-ups are reported as both readable and writable so that
/// every waiter retries its syscall and observes the failure itself.
pub(crate) struct Event {
    pub(crate) fd: RawFd,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}
