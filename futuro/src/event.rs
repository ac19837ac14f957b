//! A completion event: a condition variable layered over a small integer
//! state. Writers advance the state with [`CompletionEvent::notify`];
//! waiters block until the state reaches a target value.
//!
//! The state itself is an atomic so lock-free readers can poll it through
//! [`CompletionEvent::intrusive`] without touching the lock.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

pub(crate) struct CompletionEvent {
    state: AtomicU32,
    lock: Mutex<()>,
    cond: Condvar,
}

impl CompletionEvent {
    pub(crate) const fn new(initial: u32) -> Self {
        CompletionEvent {
            state: AtomicU32::new(initial),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Direct access to the underlying state word.
    pub(crate) fn intrusive(&self) -> &AtomicU32 {
        &self.state
    }

    /// Publishes `state` and wakes every waiter.
    ///
    /// The store is release-ordered: a waiter that observes the new state
    /// with an acquire load also observes everything written before the
    /// notify.
    pub(crate) fn notify(&self, state: u32) {
        self.state.store(state, Ordering::Release);
        // Serialize with waiters between their state check and their sleep,
        // otherwise the notify could land in that window and be lost.
        drop(self.lock.lock());
        self.cond.notify_all();
    }

    /// Blocks until the state equals `target`.
    pub(crate) fn wait(&self, target: u32) {
        if self.state.load(Ordering::Acquire) == target {
            return;
        }
        let mut guard = self.lock.lock();
        while self.state.load(Ordering::Acquire) != target {
            self.cond.wait(&mut guard);
        }
    }

    /// Blocks until the state equals `target` or `timeout` elapses.
    /// Returns true iff the target state was reached.
    pub(crate) fn wait_for(&self, target: u32, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(target, deadline),
            None => {
                self.wait(target);
                true
            }
        }
    }

    /// Blocks until the state equals `target` or `deadline` passes.
    /// Returns true iff the target state was reached.
    pub(crate) fn wait_until(&self, target: u32, deadline: Instant) -> bool {
        if self.state.load(Ordering::Acquire) == target {
            return true;
        }
        let mut guard = self.lock.lock();
        while self.state.load(Ordering::Acquire) != target {
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                return self.state.load(Ordering::Acquire) == target;
            }
        }
        true
    }
}
