//! OS readiness poller.
//!
//! The reactor only talks to the poller through `register`,
//! `reregister`, `deregister`, `poll` and the cross-thread [`Waker`].
//! Linux `epoll` is the only backend.

pub(crate) mod common;

pub(crate) use common::Waker;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;
