//! Task groups: counters of outstanding futures over a pool.
//!
//! A group counts the futures spawned against it and `wait` runs pool work
//! until the counter drains. Each future decrements the counter only after
//! its status store, so a waiter that observes zero may rely on every
//! registered future reporting ready.

use crate::executor::{Executor, Spawner};
use crate::job::Job;
use crate::pool::ThreadPool;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;

struct GroupCore {
    pool: ThreadPool,
    outstanding: Arc<AtomicI32>,
}

impl GroupCore {
    fn new(pool: ThreadPool) -> GroupCore {
        GroupCore {
            pool,
            outstanding: Arc::new(AtomicI32::new(0)),
        }
    }

    fn wait(&self) {
        while self.outstanding.load(Ordering::Acquire) > 0 {
            // Help drain the pool rather than spin.
            if !self.pool.try_run_one() {
                thread::yield_now();
            }
        }
    }

    fn register(&self) -> Option<Arc<AtomicI32>> {
        self.outstanding.fetch_add(1, Ordering::Acquire);
        Some(Arc::clone(&self.outstanding))
    }

    fn submit(&self, job: Job, force: bool) {
        if force {
            self.pool.schedule_forced(job);
        } else {
            self.pool.schedule(job);
        }
    }
}

/// A single-owner task group. Futures are spawned against it from the
/// owning thread; `wait` blocks until all of them are ready.
///
/// Not shareable across threads; use [`ConcurrentTaskGroup`] to spawn
/// from several threads at once.
pub struct TaskGroup {
    core: GroupCore,
    _not_sync: PhantomData<Cell<()>>,
}

impl TaskGroup {
    pub fn new(pool: ThreadPool) -> TaskGroup {
        TaskGroup {
            core: GroupCore::new(pool),
            _not_sync: PhantomData,
        }
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.core.pool
    }

    /// The counter of not-yet-ready futures registered with this group.
    pub fn outstanding_counter(&self) -> &Arc<AtomicI32> {
        &self.core.outstanding
    }

    /// Blocks until every future spawned against this group is ready,
    /// running pool work while it waits.
    pub fn wait(&self) {
        self.core.wait();
    }
}

impl Spawner for TaskGroup {
    fn register(&self) -> Option<Arc<AtomicI32>> {
        self.core.register()
    }

    fn submit(&self, job: Job, force: bool) {
        self.core.submit(job, force);
    }
}

/// A task group that may be shared across threads.
pub struct ConcurrentTaskGroup {
    core: GroupCore,
}

impl ConcurrentTaskGroup {
    pub fn new(pool: ThreadPool) -> ConcurrentTaskGroup {
        ConcurrentTaskGroup {
            core: GroupCore::new(pool),
        }
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.core.pool
    }

    /// The counter of not-yet-ready futures registered with this group.
    pub fn outstanding_counter(&self) -> &Arc<AtomicI32> {
        &self.core.outstanding
    }

    /// Blocks until every future spawned against this group is ready,
    /// running pool work while it waits.
    pub fn wait(&self) {
        self.core.wait();
    }
}

impl Spawner for ConcurrentTaskGroup {
    fn register(&self) -> Option<Arc<AtomicI32>> {
        self.core.register()
    }

    fn submit(&self, job: Job, force: bool) {
        self.core.submit(job, force);
    }
}
