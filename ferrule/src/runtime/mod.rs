//! Core runtime components.
//!
//! This module contains the production scheduler: a pool of worker
//! threads polling tasks, a reactor thread waiting on socket readiness,
//! and a thread off-load facility for blocking calls.
//!
//! It is responsible for:
//! - executing asynchronous tasks,
//! - tracking cooperative cancellation per task,
//! - exposing the [`Scheduler`](crate::Scheduler) used by sockets,
//! - enabling cooperative multitasking via yielding.
//!
//! Most users will interact with [`RuntimeBuilder`](builder::RuntimeBuilder),
//! [`task::spawn`] and the attribute macros rather than this module directly.

mod blocking;
mod core;
mod executor;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod handle;
pub(crate) mod yield_now;

pub mod task;

pub use core::Runtime;
