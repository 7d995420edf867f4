//! Task lifecycle states, stored in `Task::state`.

/// Waiting for a wake-up; not in the run queue.
pub(crate) const IDLE: usize = 0;

/// Sitting in the run queue.
pub(crate) const QUEUED: usize = 1;

/// Being polled by a worker. Only one worker can observe this state.
pub(crate) const RUNNING: usize = 2;

/// The future finished (or panicked) and has been dropped.
pub(crate) const COMPLETED: usize = 3;

/// Woken while running; re-queued as soon as the current poll returns.
pub(crate) const NOTIFIED: usize = 4;
