//! Readiness reactor.
//!
//! A dedicated thread owns the OS poller and the table of tasks waiting for
//! descriptors to become readable or writable. Tasks talk to it through
//! [`Command`](command::Command) messages; it answers by waking them.
//!
//! Socket code never touches this module directly: it goes through the
//! [`Scheduler`](crate::Scheduler) implementation in the runtime.

mod core;
mod event;
mod io;
mod poller;

pub(crate) mod command;
pub(crate) mod future;

pub(crate) use core::{Reactor, ReactorHandle};
pub(crate) use poller::common::Interest;
