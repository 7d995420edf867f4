use super::executor::core::Executor;
use super::handle::Handle;
use super::task::JoinHandle;
use crate::reactor::command::Command;
use crate::reactor::{Reactor, ReactorHandle};

use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

/// The main runtime handle.
///
/// `Runtime` is responsible for:
/// - spawning asynchronous tasks,
/// - driving task execution via the executor,
/// - integrating with the reactor for socket readiness,
/// - providing a synchronous entry point via [`block_on`](Self::block_on).
///
/// Dropping the runtime shuts down all internal components in an orderly
/// fashion.
pub struct Runtime {
    /// Task executor responsible for scheduling and running futures.
    executor: Executor,

    /// Handle to the reactor thread.
    reactor_handle: ReactorHandle,

    /// The reactor thread itself, joined on drop.
    reactor_thread: Option<thread::JoinHandle<()>>,
}

impl Runtime {
    /// Starts the reactor and `worker_threads` workers, naming their
    /// threads after `thread_name`.
    pub(crate) fn new(worker_threads: usize, thread_name: &str) -> io::Result<Self> {
        let (reactor_handle, reactor_thread) = Reactor::start(thread_name)?;

        let executor = match Executor::new(reactor_handle.clone(), worker_threads, thread_name) {
            Ok(executor) => executor,
            Err(err) => {
                let _ = reactor_handle.send(Command::Shutdown);
                let _ = reactor_thread.join();
                return Err(err);
            }
        };

        tracing::debug!(worker_threads, thread_name, "runtime started");

        Ok(Self {
            executor,
            reactor_handle,
            reactor_thread: Some(reactor_thread),
        })
    }

    /// Returns the scheduler handle of this runtime.
    pub fn handle(&self) -> Handle {
        Handle::new(self.reactor_handle.clone())
    }

    /// Spawns a future onto the runtime.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let handle = runtime.spawn(async { 1 + 1 });
    /// ```
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.executor.spawn(future)
    }

    /// Runs a future to completion, blocking the current thread.
    ///
    /// The future runs as a task on the worker pool, so it has access to
    /// the reactor like any spawned task. A panic inside it is resumed on
    /// the calling thread.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result = runtime.block_on(async {
    ///     42
    /// });
    /// assert_eq!(result, 42);
    /// ```
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut handle = pin!(self.spawn(future));

        let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
        let mut cx = Context::from_waker(&waker);

        loop {
            match handle.as_mut().poll(&mut cx) {
                Poll::Ready(value) => return value,
                Poll::Pending => thread::park(),
            }
        }
    }
}

/// Unparks the thread blocked in [`Runtime::block_on`].
struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

impl Drop for Runtime {
    /// Shuts down the runtime.
    ///
    /// 1. Stops the workers and drops queued tasks
    /// 2. Joins all worker threads
    /// 3. Stops the reactor, failing any remaining waiters, and joins it
    fn drop(&mut self) {
        self.executor.shutdown();
        self.executor.join();

        let _ = self.reactor_handle.send(Command::Shutdown);

        if let Some(thread) = self.reactor_thread.take() {
            let _ = thread.join();
        }

        tracing::debug!("runtime stopped");
    }
}
