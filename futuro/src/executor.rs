//! Executor collaborators: where scheduled jobs go.

use crate::job::Job;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::AtomicI32;

/// Anything that accepts one-shot jobs for execution.
///
/// Executors are cheap cloneable handles; continuation nodes keep a clone
/// until the upstream future settles.
pub trait Executor: Send + Sync + 'static {
    /// Accepts a job. The executor is free to run it inline on the calling
    /// thread.
    fn schedule(&self, job: Job);

    /// Accepts a job that must be queued, never run inline.
    fn schedule_forced(&self, job: Job);
}

/// A place a new future can be submitted: bare executors, task groups and
/// the interception invokers.
pub trait Spawner {
    /// Registers the new future and returns the outstanding counter it
    /// must decrement on completion, if this spawner tracks one.
    fn register(&self) -> Option<Arc<AtomicI32>> {
        None
    }

    /// Submits the scheduled run.
    fn submit(&self, job: Job, force: bool);
}

impl<E: Executor> Spawner for E {
    fn submit(&self, job: Job, force: bool) {
        if force {
            self.schedule_forced(job);
        } else {
            self.schedule(job);
        }
    }
}

/// Degenerate executor that runs every job synchronously on the
/// scheduling thread.
///
/// Forced queuing is meaningless here: there is no queue, so both entry
/// points run inline.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateInvoker;

impl Executor for ImmediateInvoker {
    fn schedule(&self, job: Job) {
        job.run();
    }

    fn schedule_forced(&self, job: Job) {
        job.run();
    }
}

/// Degenerate executor that captures the first scheduled job instead of
/// running it.
///
/// The `when_all` combinators use this to intercept a would-be scheduling
/// step and fire it later, once every input has settled.
#[derive(Debug, Default, Clone)]
pub struct InterceptionInvoker {
    slot: Arc<Mutex<Option<Job>>>,
}

impl InterceptionInvoker {
    pub fn new() -> InterceptionInvoker {
        InterceptionInvoker::default()
    }

    /// The captured job, if anything was scheduled.
    pub fn take(&self) -> Option<Job> {
        self.slot.lock().take()
    }
}

impl Executor for InterceptionInvoker {
    fn schedule(&self, job: Job) {
        *self.slot.lock() = Some(job);
    }

    fn schedule_forced(&self, job: Job) {
        *self.slot.lock() = Some(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn immediate_invoker_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let invoker = ImmediateInvoker;
        let job = {
            let hits = Arc::clone(&hits);
            Job::new(move || {
                hits.fetch_add(1, Ordering::Relaxed);
            })
        };
        invoker.schedule(job);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn interception_captures_the_job() {
        let invoker = InterceptionInvoker::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let job = {
            let hits = Arc::clone(&hits);
            Job::new(move || {
                hits.fetch_add(1, Ordering::Relaxed);
            })
        };
        invoker.schedule_forced(job);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
        invoker.take().expect("captured").run();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(invoker.take().is_none());
    }
}
