use crate::runtime::task::Runnable;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Shared handle to the run queue.
pub(crate) type InjectorHandle = Arc<Injector>;

/// Run queue shared by every worker.
///
/// Newly spawned and freshly woken tasks are pushed to the back; idle
/// workers block on the condition variable until a task or shutdown
/// arrives.
pub(crate) struct Injector {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

struct QueueState {
    tasks: VecDeque<Arc<dyn Runnable>>,
    shutdown: bool,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                shutdown: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Pushes a runnable task and wakes one idle worker.
    ///
    /// Tasks pushed after shutdown are dropped.
    pub(crate) fn push(&self, task: Arc<dyn Runnable>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.shutdown {
            return;
        }

        state.tasks.push_back(task);
        drop(state);

        self.condvar.notify_one();
    }

    /// Takes the next task, blocking while the queue is empty.
    ///
    /// Returns `None` once shutdown has been requested.
    pub(crate) fn next(&self) -> Option<Arc<dyn Runnable>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if state.shutdown {
                return None;
            }

            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }

            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Signals shutdown, drops queued tasks and wakes every worker.
    pub(crate) fn shutdown(&self) {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.shutdown = true;
            std::mem::take(&mut state.tasks)
        };

        self.condvar.notify_all();

        // Dropped outside the lock: a task's destructor may push again.
        drop(pending);
    }
}
