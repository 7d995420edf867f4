use std::os::fd::RawFd;

/// Readiness a task can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const READ: Interest = Interest {
        read: true,
        write: false,
    };

    pub(crate) const WRITE: Interest = Interest {
        read: false,
        write: true,
    };

    pub(crate) fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// Wake-up handle for the poller, wrapping its `eventfd`.
///
/// The descriptor is closed once the last handle is dropped.
pub(crate) struct Waker(pub(crate) RawFd);

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}
