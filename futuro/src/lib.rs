//! Deferred task values.
//!
//! A [`Future`] is a reference-counted handle to the result of a
//! computation submitted to an executor collaborator. The body runs
//! exactly once; waiters may steal not-yet-started work and run it inline;
//! continuations chain lock-free and fire when the value settles.
//!
//! ```
//! use futuro::{Future, Policy, ThreadPool};
//!
//! # fn main() -> anyhow::Result<()> {
//! let pool = ThreadPool::new(2)?;
//!
//! let answer = Future::spawn(|| 6 * 7, &pool, Policy::DEFERRED);
//! let doubled = answer.then(|a| *a.get() * 2, &pool, Policy::empty());
//!
//! assert_eq!(*doubled.get(), 84);
//! # Ok(())
//! # }
//! ```
//!
//! Futures spawned against a [`TaskGroup`] decrement the group's
//! outstanding counter when they settle, so [`TaskGroup::wait`] returning
//! implies every one of them reports ready. [`when_all`] and
//! [`when_all_tuple`] aggregate readiness without touching the inputs'
//! own outcomes.

mod alloc;
mod cell;
mod combinators;
mod event;
mod executor;
mod future;
mod group;
mod job;
mod policy;
mod pool;

pub use self::cell::BodyPanic;
pub use self::combinators::{FutureTuple, make_ready_future, when_all, when_all_tuple};
pub use self::executor::{Executor, ImmediateInvoker, InterceptionInvoker, Spawner};
pub use self::future::Future;
pub use self::group::{ConcurrentTaskGroup, TaskGroup};
pub use self::job::Job;
pub use self::policy::{Policy, WaitStatus};
pub use self::pool::ThreadPool;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
mod tests;
