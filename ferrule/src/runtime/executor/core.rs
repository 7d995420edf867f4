use super::{Injector, InjectorHandle};
use crate::reactor::ReactorHandle;
use crate::runtime::context::enter_context;
use crate::runtime::task::{JoinHandle, Task};

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle as ThreadHandle};

/// Multi-threaded task executor.
///
/// The `Executor` owns the run queue and a fixed pool of worker threads.
/// Every worker runs inside the runtime context, so tasks can spawn more
/// tasks and reach the reactor through thread-locals.
pub(crate) struct Executor {
    /// Run queue shared by all workers.
    injector: InjectorHandle,

    /// Join handles for worker threads.
    handles: Vec<ThreadHandle<()>>,
}

impl Executor {
    /// Starts `threads` workers named `{prefix}-worker-N`.
    pub(crate) fn new(reactor: ReactorHandle, threads: usize, prefix: &str) -> io::Result<Self> {
        let injector = Arc::new(Injector::new());
        let mut executor = Self {
            injector,
            handles: Vec::with_capacity(threads),
        };

        for id in 0..threads {
            let reactor = reactor.clone();
            let injector = executor.injector.clone();

            let spawned = thread::Builder::new()
                .name(format!("{prefix}-worker-{id}"))
                .spawn(move || {
                    enter_context(reactor, injector.clone(), || {
                        while let Some(task) = injector.next() {
                            task.run();
                        }
                    });
                });

            match spawned {
                Ok(handle) => executor.handles.push(handle),
                Err(err) => {
                    executor.shutdown();
                    executor.join();
                    return Err(err);
                }
            }
        }

        Ok(executor)
    }

    /// Spawns a new asynchronous task onto the executor.
    pub(crate) fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let task = Arc::new(Task::new(future, self.injector.clone()));
        self.injector.push(task.clone());

        JoinHandle { task }
    }

    /// Signals all workers to stop once their current task returns.
    pub(crate) fn shutdown(&self) {
        self.injector.shutdown();
    }

    /// Waits for all worker threads to terminate.
    pub(crate) fn join(&mut self) {
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}
