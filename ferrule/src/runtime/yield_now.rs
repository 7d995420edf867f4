use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Pending on its first poll (after waking itself), ready on the second.
struct YieldOnce {
    yielded: bool,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Puts the current task at the back of the run queue.
///
/// Lets other tasks make progress before the current one continues, for
/// example between two socket operations in a tight loop.
pub async fn yield_now() {
    YieldOnce { yielded: false }.await
}
