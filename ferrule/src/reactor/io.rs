use crate::reactor::poller::common::Interest;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Waker;

/// Still waiting for readiness.
pub(crate) const WAITING: u8 = 0;

/// The descriptor became ready for the awaited interest.
pub(crate) const READY: u8 = 1;

/// The descriptor was closed (or the reactor stopped) while waiting.
pub(crate) const CLOSED: u8 = 2;

/// The waiting future was dropped or cancelled; the reactor skips it.
pub(crate) const ABANDONED: u8 = 3;

/// One task waiting for one interest on one descriptor.
///
/// Shared between the waiting future and the reactor. The state only ever
/// leaves [`WAITING`] once, so a waiter fires at most one time.
pub(crate) struct Waiter {
    state: AtomicU8,
    waker: Mutex<Option<Waker>>,
}

impl Waiter {
    /// A waiter with no task attached yet; the first poll supplies one.
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(WAITING),
            waker: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn is_waiting(&self) -> bool {
        self.state() == WAITING
    }

    /// Replaces the stored waker with the one from the latest poll.
    pub(crate) fn set_waker(&self, waker: &Waker) {
        let mut slot = self.waker.lock().unwrap_or_else(PoisonError::into_inner);

        match slot.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    /// Moves out of [`WAITING`] into `outcome` and wakes the task.
    pub(crate) fn complete(&self, outcome: u8) {
        if self
            .state
            .compare_exchange(WAITING, outcome, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = self
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(crate) fn abandon(&self) {
        let _ = self.state.compare_exchange(
            WAITING,
            ABANDONED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Everything the reactor knows about one descriptor.
#[derive(Default)]
pub(crate) struct IoEntry {
    readers: Vec<Arc<Waiter>>,
    writers: Vec<Arc<Waiter>>,

    /// Interest currently installed in the poller, if any.
    pub(crate) registered: Option<Interest>,
}

impl IoEntry {
    pub(crate) fn add(&mut self, interest: Interest, waiter: Arc<Waiter>) {
        if interest.read {
            self.readers.push(waiter);
        } else {
            self.writers.push(waiter);
        }
    }

    /// Interest still needed by live waiters. Abandoned waiters are pruned.
    pub(crate) fn desired(&mut self) -> Interest {
        self.readers.retain(|w| w.is_waiting());
        self.writers.retain(|w| w.is_waiting());

        Interest {
            read: !self.readers.is_empty(),
            write: !self.writers.is_empty(),
        }
    }

    /// Wakes the waiters matching a readiness event.
    pub(crate) fn fire(&mut self, readable: bool, writable: bool) {
        if readable {
            self.readers.drain(..).for_each(|w| w.complete(READY));
        }

        if writable {
            self.writers.drain(..).for_each(|w| w.complete(READY));
        }
    }

    /// Wakes every waiter with [`CLOSED`].
    pub(crate) fn close_all(self) {
        self.readers
            .into_iter()
            .chain(self.writers)
            .for_each(|w| w.complete(CLOSED));
    }
}
