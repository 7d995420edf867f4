use super::Runtime;

use std::io;
use std::thread;

/// Configures and starts a [`Runtime`].
///
/// The defaults are one worker per logical CPU and threads named
/// `ferrule-reactor` and `ferrule-worker-N`.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .worker_threads(2)
///     .thread_name("proxy")
///     .build();
/// ```
pub struct RuntimeBuilder {
    worker_threads: usize,

    /// Prefix of the reactor and worker thread names.
    thread_name: String,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            worker_threads,
            thread_name: "ferrule".into(),
        }
    }

    /// Sets how many threads poll tasks.
    ///
    /// A single worker still drives any number of sockets: every task
    /// suspends on readiness instead of blocking the thread.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Sets the prefix used to name the runtime's threads.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Starts the reactor and the worker threads.
    ///
    /// Fails if the OS refuses to create the poller or a thread.
    pub fn try_build(self) -> io::Result<Runtime> {
        Runtime::new(self.worker_threads, &self.thread_name)
    }

    /// Like [`try_build`](Self::try_build), but panics on failure.
    pub fn build(self) -> Runtime {
        match self.try_build() {
            Ok(runtime) => runtime,
            Err(err) => panic!("failed to start the ferrule runtime: {err}"),
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
