//! Linux `epoll` backend.
//!
//! Descriptors are registered level-triggered with their own number as the
//! event token. An `eventfd` registered under [`WAKE_TOKEN`] lets other
//! threads interrupt a blocking `epoll_wait`.

use super::common::Interest;
use crate::reactor::event::Event;
use crate::reactor::poller::Waker;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Token of the wake-up `eventfd`. Never a valid descriptor number.
const WAKE_TOKEN: u64 = u64::MAX;

pub(crate) struct EpollPoller {
    epoll: RawFd,
    events: Vec<epoll_event>,
    waker: Arc<Waker>,
}

unsafe impl Send for EpollPoller {}

impl Waker {
    /// Interrupts a blocking `epoll_wait`.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }
}

fn flags_for(interest: Interest) -> u32 {
    let mut flags = 0;

    if interest.read {
        flags |= EPOLLIN | EPOLLRDHUP;
    }
    if interest.write {
        flags |= EPOLLOUT;
    }

    flags as u32
}

impl EpollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        if unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) } < 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(eventfd);
                libc::close(epoll);
            }
            return Err(err);
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(64),
            waker: Arc::new(Waker(eventfd)),
        })
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    fn control(&self, op: libc::c_int, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: flags_for(interest),
            u64: fd as u64,
        };

        if unsafe { epoll_ctl(self.epoll, op, fd, &mut event) } < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Starts watching `fd`.
    ///
    /// A descriptor number left over from a closed socket is still known to
    /// the reactor but no longer to epoll, so `EEXIST` and `ENOENT` are
    /// resolved by switching between add and modify.
    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.control(EPOLL_CTL_ADD, fd, interest) {
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                self.control(EPOLL_CTL_MOD, fd, interest)
            }
            other => other,
        }
    }

    /// Changes the interest of an already watched `fd`.
    pub(crate) fn reregister(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.control(EPOLL_CTL_MOD, fd, interest) {
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
                self.control(EPOLL_CTL_ADD, fd, interest)
            }
            other => other,
        }
    }

    /// Stops watching `fd`. Already-closed descriptors are ignored.
    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    /// Waits for readiness events, the wake event, or `timeout`.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let timeout_ms = timeout.map(|t| t.as_millis() as i32).unwrap_or(-1);

        events.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in self.events.drain(..) {
            if ev.u64 == WAKE_TOKEN {
                let mut buf = 0u64;
                unsafe {
                    libc::read(self.waker.0, &mut buf as *mut _ as *mut _, 8);
                }
                continue;
            }

            let flags = ev.events;
            let hangup = flags & ((EPOLLERR | EPOLLHUP) as u32) != 0;

            events.push(Event {
                fd: ev.u64 as RawFd,
                readable: hangup || flags & ((EPOLLIN | EPOLLRDHUP) as u32) != 0,
                writable: hangup || flags & (EPOLLOUT as u32) != 0,
            });
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}
