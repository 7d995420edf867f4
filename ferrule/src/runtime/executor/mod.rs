//! Task executor implementation.
//!
//! It is composed of:
//! - [`core`]: the worker pool and its lifecycle,
//! - [`injector`]: the shared run queue workers sleep on.

pub(crate) mod core;
pub(crate) mod injector;

pub(crate) use injector::{Injector, InjectorHandle};
