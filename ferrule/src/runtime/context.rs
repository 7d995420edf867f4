use crate::reactor::ReactorHandle;
use crate::runtime::executor::InjectorHandle;

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

thread_local! {
    /// Thread-local handle to the current reactor.
    ///
    /// Set on worker threads so sockets can reach the reactor without
    /// explicit parameter passing.
    pub(crate) static CURRENT_REACTOR: RefCell<Option<ReactorHandle>> =
        const { RefCell::new(None) };

    /// Thread-local handle to the shared run queue, used by `task::spawn`.
    pub(crate) static CURRENT_INJECTOR: RefCell<Option<InjectorHandle>> =
        const { RefCell::new(None) };

    /// Cancellation flag of the task currently being polled on this thread.
    static CURRENT_CANCEL: RefCell<Option<Arc<AtomicBool>>> =
        const { RefCell::new(None) };
}

/// Enters the runtime execution context for the current thread.
///
/// Installs the reactor and injector handles for the duration of `f`,
/// then restores whatever was installed before.
pub(crate) fn enter_context<R>(
    reactor: ReactorHandle,
    injector: InjectorHandle,
    f: impl FnOnce() -> R,
) -> R {
    CURRENT_REACTOR.with(|r| {
        CURRENT_INJECTOR.with(|i| {
            let prev_r = r.replace(Some(reactor));
            let prev_i = i.replace(Some(injector));

            let out = f();

            i.replace(prev_i);
            r.replace(prev_r);

            out
        })
    })
}

/// Marks `flag` as the current task's cancellation flag while `f` polls it.
pub(crate) fn enter_task<R>(flag: &Arc<AtomicBool>, f: impl FnOnce() -> R) -> R {
    CURRENT_CANCEL.with(|c| {
        let prev = c.replace(Some(flag.clone()));
        let out = f();
        c.replace(prev);
        out
    })
}

/// Returns `true` if the task being polled on this thread was cancelled.
///
/// Always `false` outside a task.
pub(crate) fn is_cancelled() -> bool {
    CURRENT_CANCEL.with(|c| {
        c.borrow()
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    })
}
