//! A modest queue-backed thread pool.
//!
//! One shared injector queue drained by a fixed set of workers; not a
//! work-stealing scheduler. It is the executor surface task groups and the
//! blocking waits need. Jobs scheduled from a worker thread may run inline
//! unless forced queuing is requested.

use crate::executor::Executor;
use crate::job::Job;
use anyhow::{Context, Result, ensure};
use crossbeam_deque::{Injector, Steal};
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

thread_local! {
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };
}

pub struct ThreadPool {
    inner: Arc<Inner>,
}

struct Inner {
    queue: Injector<Job>,
    sleep_lock: Mutex<()>,
    wakeup: Condvar,
    shutdown: AtomicBool,
    user_handles: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Starts a pool with `workers` threads.
    pub fn new(workers: usize) -> Result<ThreadPool> {
        ensure!(workers > 0, "thread pool needs at least one worker");

        let inner = Arc::new(Inner {
            queue: Injector::new(),
            sleep_lock: Mutex::new(()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            user_handles: AtomicUsize::new(1),
            workers: Mutex::new(Vec::with_capacity(workers)),
        });

        for id in 0..workers {
            let worker = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("futuro-{id}"))
                .spawn(move || worker_loop(worker));
            match handle {
                Ok(handle) => inner.workers.lock().push(handle),
                Err(err) => {
                    // Stop the workers already started before bailing out.
                    inner.shutdown.store(true, Ordering::Release);
                    inner.wakeup.notify_all();
                    return Err(err).with_context(|| format!("failed to spawn worker {id}"));
                }
            }
        }

        Ok(ThreadPool { inner })
    }

    /// Pops and runs one queued job. False when the queue was empty.
    pub(crate) fn try_run_one(&self) -> bool {
        loop {
            match self.inner.queue.steal() {
                Steal::Success(job) => {
                    job.run();
                    return true;
                }
                Steal::Empty => return false,
                Steal::Retry => {}
            }
        }
    }

    fn push(&self, job: Job) {
        self.inner.queue.push(job);
        // Serialize with a worker between its empty check and its sleep.
        drop(self.inner.sleep_lock.lock());
        self.inner.wakeup.notify_one();
    }
}

impl Executor for ThreadPool {
    fn schedule(&self, job: Job) {
        // Workers may run new work inline instead of taking a queue round
        // trip; callers that cannot tolerate that use schedule_forced.
        if IN_WORKER.get() {
            job.run();
        } else {
            self.push(job);
        }
    }

    fn schedule_forced(&self, job: Job) {
        self.push(job);
    }
}

impl Clone for ThreadPool {
    fn clone(&self) -> ThreadPool {
        self.inner.user_handles.fetch_add(1, Ordering::Relaxed);
        ThreadPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if self.inner.user_handles.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        // Last user handle: stop the workers. Jobs still queued are
        // dropped, which releases their futures' scheduled-run counts.
        self.inner.shutdown.store(true, Ordering::Release);
        drop(self.inner.sleep_lock.lock());
        self.inner.wakeup.notify_all();
        let workers = mem::take(&mut *self.inner.workers.lock());
        let me = thread::current().id();
        for handle in workers {
            if handle.thread().id() != me {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    IN_WORKER.set(true);
    loop {
        match inner.queue.steal() {
            Steal::Success(job) => job.run(),
            Steal::Retry => {}
            Steal::Empty => {
                if inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                let mut guard = inner.sleep_lock.lock();
                if inner.queue.is_empty() && !inner.shutdown.load(Ordering::Acquire) {
                    inner.wakeup.wait(&mut guard);
                }
            }
        }
    }
    // Drain leftovers so queued jobs release whatever they own.
    loop {
        match inner.queue.steal() {
            Steal::Success(job) => drop(job),
            Steal::Empty => break,
            Steal::Retry => {}
        }
    }
}
