//! Executors for tests.

use crate::executor::Executor;
use crate::job::Job;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A pool that only queues: nothing runs until the test says so.
#[derive(Clone, Default)]
pub(crate) struct ManualPool {
    queue: Arc<Mutex<VecDeque<Job>>>,
}

impl ManualPool {
    pub(crate) fn new() -> ManualPool {
        ManualPool::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs the oldest queued job, if any.
    pub(crate) fn run_one(&self) -> bool {
        let job = self.queue.lock().pop_front();
        match job {
            Some(job) => {
                job.run();
                true
            }
            None => false,
        }
    }

    /// Runs queued jobs until the queue stays empty; returns how many ran.
    pub(crate) fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl Executor for ManualPool {
    fn schedule(&self, job: Job) {
        self.queue.lock().push_back(job);
    }

    fn schedule_forced(&self, job: Job) {
        self.queue.lock().push_back(job);
    }
}
