use super::JoinHandle;
use super::state::{COMPLETED, IDLE, NOTIFIED, QUEUED, RUNNING};
use crate::runtime::context::{self, CURRENT_INJECTOR};
use crate::runtime::executor::InjectorHandle;

use std::any::Any;
use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

/// A runnable unit of work that can be executed by the scheduler.
///
/// Erases the output type so the run queue can hold `Arc<dyn Runnable>`.
pub(crate) trait Runnable: Send + Sync {
    fn run(self: Arc<Self>);
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Outcome of a task: its output, or the payload of the panic that ended it.
pub(crate) type TaskResult<T> = Result<T, Box<dyn Any + Send + 'static>>;

/// A spawned asynchronous task managed by the runtime.
pub(crate) struct Task<T> {
    /// The future, dropped as soon as the task completes.
    ///
    /// Only touched by the worker that moved the state to `RUNNING`.
    future: UnsafeCell<Option<BoxFuture<T>>>,

    /// Result produced on completion, taken by the `JoinHandle`.
    pub(crate) result: Mutex<Option<TaskResult<T>>>,

    /// Lifecycle state (`IDLE`, `QUEUED`, ...).
    pub(crate) state: AtomicUsize,

    /// Cooperative cancellation flag, visible to the future while it polls.
    pub(crate) cancelled: Arc<AtomicBool>,

    /// Run queue used to reschedule the task when woken.
    injector: InjectorHandle,

    /// Wakers of the `JoinHandle` awaiting this task.
    pub(crate) waiters: Mutex<Vec<Waker>>,
}

unsafe impl<T: Send> Send for Task<T> {}
unsafe impl<T: Send> Sync for Task<T> {}

impl<T: Send + 'static> Task<T> {
    /// Creates a task in the `QUEUED` state; the caller pushes it.
    pub(crate) fn new<F>(future: F, injector: InjectorHandle) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            future: UnsafeCell::new(Some(Box::pin(future))),
            result: Mutex::new(None),
            state: AtomicUsize::new(QUEUED),
            cancelled: Arc::new(AtomicBool::new(false)),
            injector,
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Polls the future once.
    ///
    /// A panic inside the future completes the task; the payload is
    /// re-raised wherever the `JoinHandle` is awaited.
    fn poll_once(self: Arc<Self>) {
        let current = self.state.load(Ordering::Acquire);

        if current != QUEUED && current != NOTIFIED {
            return;
        }

        // RUNNING gives this worker exclusive access to the future.
        if self
            .state
            .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let polled = context::enter_task(&self.cancelled, || {
            panic::catch_unwind(AssertUnwindSafe(|| {
                let future = unsafe { &mut *self.future.get() };

                match future.as_mut() {
                    Some(future) => future.as_mut().poll(&mut cx),
                    None => Poll::Pending,
                }
            }))
        });

        match polled {
            Ok(Poll::Pending) => {
                if self
                    .state
                    .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Woken while running: go straight back to the queue.
                    self.state.store(QUEUED, Ordering::Release);
                    self.injector.push(self.clone());
                }
            }
            Ok(Poll::Ready(value)) => self.complete(Ok(value)),
            Err(payload) => self.complete(Err(payload)),
        }
    }

    fn complete(&self, result: TaskResult<T>) {
        // Release sockets and other resources before anyone observes completion.
        let future = unsafe { (*self.future.get()).take() };
        let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(future)));

        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.state.store(COMPLETED, Ordering::Release);

        let waiters = std::mem::take(&mut *self.waiters.lock().unwrap_or_else(PoisonError::into_inner));
        for w in waiters {
            w.wake();
        }
    }

    /// Requests cooperative cancellation and wakes the task so pending
    /// readiness waits observe it.
    pub(crate) fn cancel(self: &Arc<Self>) {
        self.cancelled.store(true, Ordering::Release);
        self.clone().schedule();
    }

    /// Signals the task to be rescheduled.
    ///
    /// An `IDLE` task is queued; a `RUNNING` one is marked `NOTIFIED` so it
    /// is polled again right after its current poll.
    fn schedule(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.injector.push(self.clone());
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}

impl<T: Send + 'static> Wake for Task<T> {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.clone().schedule();
    }
}

impl<T: Send + 'static> Runnable for Task<T> {
    fn run(self: Arc<Self>) {
        self.poll_once()
    }
}

/// Spawns a future as a task onto the current runtime.
///
/// # Panics
///
/// Panics if called outside the context of a running runtime.
pub fn spawn<F, T>(future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let injector = CURRENT_INJECTOR.with(|cell| cell.borrow().clone());

    let Some(injector) = injector else {
        panic!("spawn must be called within the context of a runtime");
    };

    let task = Arc::new(Task::new(future, injector.clone()));
    injector.push(task.clone());

    JoinHandle { task }
}
