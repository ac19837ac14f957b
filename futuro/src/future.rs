//! The owning handle to a deferred task value.

use crate::cell::{self, RawFuture};
use crate::executor::{Executor, Spawner};
use crate::policy::{Policy, WaitStatus};
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::time::{Duration, Instant};

/// A reference-counted handle to the result of a deferred computation.
///
/// The body runs exactly once, on whichever thread claims it first: an
/// executor worker, or (with [`Policy::DEFERRED`]) a thread that waited
/// for the value. Handles are cheap to clone; the value settles once and
/// is readable from any number of them.
///
/// A handle obtained through [`Future::default`] holds no computation;
/// every operation except [`Future::valid`] panics on it.
pub struct Future<T> {
    raw: Option<RawFuture>,
    _p: PhantomData<T>,
}

// The value crosses threads when the body runs remotely, and shared
// handles hand out references to it.
unsafe impl<T: Send> Send for Future<T> {}
unsafe impl<T: Send + Sync> Sync for Future<T> {}

impl<T: Send + 'static> Future<T> {
    /// Spawns `body` onto `spawner` and returns the handle to its value.
    ///
    /// [`Policy::ASYNC`] forces the body through the spawner's queued
    /// path; [`Policy::DEFERRED`] lets a waiter run it inline instead.
    pub fn spawn<F, S>(body: F, spawner: &S, policy: Policy) -> Future<T>
    where
        F: FnOnce() -> T + Send + 'static,
        S: Spawner + ?Sized,
    {
        let counter = spawner.register();
        let raw = cell::new_cell(body, policy.contains(Policy::DEFERRED), counter);
        spawner.submit(unsafe { raw.as_job() }, policy.contains(Policy::ASYNC));
        Future::from_raw(raw)
    }

    /// Attaches `f` to run on `executor` once this future settles.
    ///
    /// `f` receives a handle to this future; reading it resurfaces an
    /// upstream failure, so `f` decides whether to propagate. Returns the
    /// handle to `f`'s own value.
    pub fn then<R, G, E>(&self, f: G, executor: &E, policy: Policy) -> Future<R>
    where
        R: Send + 'static,
        G: FnOnce(Future<T>) -> R + Send + 'static,
        E: Executor + Clone,
    {
        let raw = self.expect_raw();
        let upstream = self.clone();
        let body = move || {
            upstream.wait();
            f(upstream)
        };
        let downstream = cell::new_cell(body, policy.contains(Policy::DEFERRED), None);
        raw.attach_or_execute(downstream, executor.clone(), policy.contains(Policy::ASYNC));
        Future::from_raw(downstream)
    }
}

impl<T> Future<T> {
    pub(crate) fn from_raw(raw: RawFuture) -> Future<T> {
        Future {
            raw: Some(raw),
            _p: PhantomData,
        }
    }

    fn expect_raw(&self) -> RawFuture {
        self.raw.expect("operation on an invalid future handle")
    }

    /// True iff this handle holds a computation.
    pub fn valid(&self) -> bool {
        self.raw.is_some()
    }

    /// Non-blocking readiness hint.
    ///
    /// For a reading that synchronizes with the value itself, use
    /// [`Future::wait`] or [`Future::get`].
    pub fn ready(&self) -> bool {
        self.expect_raw().ready()
    }

    /// Blocks until the value settles. With [`Policy::DEFERRED`], a
    /// not-yet-started body is run inline on this thread instead.
    pub fn wait(&self) {
        self.expect_raw().wait();
    }

    /// Like [`Future::wait`], but gives up after `timeout`.
    pub fn wait_for(&self, timeout: Duration) -> WaitStatus {
        self.expect_raw().wait_for(timeout)
    }

    /// Like [`Future::wait`], but gives up at `deadline`.
    pub fn wait_until(&self, deadline: Instant) -> WaitStatus {
        self.expect_raw().wait_until(deadline)
    }

    /// Waits for the value and borrows it.
    ///
    /// # Panics
    ///
    /// Re-raises the body's panic (payload [`BodyPanic`]) if the body
    /// failed. Panics on an invalid handle.
    ///
    /// [`BodyPanic`]: crate::BodyPanic
    pub fn get(&self) -> &T {
        let raw = self.expect_raw();
        raw.wait();
        unsafe { &*raw.result_ptr::<T>() }
    }

    /// Waits for the value and moves it out when this handle is the sole
    /// owner. Returns the handle unchanged when other handles, or a
    /// scheduled run still sitting in a queue, share the cell.
    ///
    /// # Panics
    ///
    /// Re-raises the body's panic if the body failed.
    pub fn try_take(self) -> Result<T, Future<T>> {
        let raw = self.expect_raw();
        raw.wait();
        if raw.refs() != 1 {
            return Err(self);
        }
        let mut value = MaybeUninit::<T>::uninit();
        unsafe {
            raw.take_result(value.as_mut_ptr());
            Ok(value.assume_init())
        }
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Future<T> {
        if let Some(raw) = self.raw {
            raw.ref_inc();
        }
        Future {
            raw: self.raw,
            _p: PhantomData,
        }
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            raw.ref_dec();
        }
    }
}

impl<T> Default for Future<T> {
    /// An invalid handle: `valid` reports false.
    fn default() -> Future<T> {
        Future {
            raw: None,
            _p: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some(raw) => write!(
                fmt,
                "Future({:p}, ready: {})",
                raw.header_ptr(),
                raw.ready()
            ),
            None => write!(fmt, "Future(invalid)"),
        }
    }
}
