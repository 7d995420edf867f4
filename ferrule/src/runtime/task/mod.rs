//! Asynchronous task primitives.
//!
//! Tasks are spawned with [`spawn`] and observed or cancelled through their
//! [`JoinHandle`]. Cancellation is cooperative: the task keeps running, but
//! every socket operation it performs afterwards fails with
//! [`Error::Cancelled`](crate::Error::Cancelled).

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod state;

pub(crate) use core::{Runnable, Task};

pub use core::spawn;
pub use handle::JoinHandle;
