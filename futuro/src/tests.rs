//! End-to-end behavior of futures, groups and combinators.

use crate::test_utils::ManualPool;
use crate::{
    BodyPanic, ConcurrentTaskGroup, Future, ImmediateInvoker, InterceptionInvoker, Policy,
    TaskGroup, ThreadPool, WaitStatus, make_ready_future, when_all, when_all_tuple,
};
use anyhow::Result;
use rstest::rstest;
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

assert_impl_all!(Future<i32>: Send, Sync, Clone);
assert_impl_all!(ThreadPool: Send, Sync, Clone);
assert_impl_all!(ConcurrentTaskGroup: Send, Sync);
assert_not_impl_any!(TaskGroup: Sync);

#[test]
fn deferred_wait_steals_inline() {
    let pool = ManualPool::new();
    let fut = Future::spawn(|| 42, &pool, Policy::DEFERRED);
    assert!(!fut.ready());

    // Nothing ever dequeues; the wait runs the body on this thread.
    fut.wait();
    assert_eq!(*fut.get(), 42);

    // The stale queue entry is a no-op once the value settled.
    assert_eq!(pool.run_all(), 1);
    assert_eq!(*fut.get(), 42);
}

#[test]
fn forced_async_waits_for_a_worker() {
    let pool = ManualPool::new();
    let fut = Future::spawn(|| 42, &pool, Policy::ASYNC);
    assert!(!fut.ready());

    let worker = {
        let pool = pool.clone();
        thread::spawn(move || {
            while pool.run_all() == 0 {
                thread::yield_now();
            }
        })
    };

    fut.wait();
    assert_eq!(*fut.get(), 42);
    worker.join().unwrap();
}

#[test]
fn continuation_attached_before_ready() {
    let pool = ManualPool::new();
    let a = Future::spawn(|| 10, &pool, Policy::empty());
    let b = a.then(|a| a.get() + 1, &ImmediateInvoker, Policy::empty());
    assert!(!b.ready());

    assert_eq!(pool.run_all(), 1);
    assert!(b.ready());
    assert_eq!(*b.get(), 11);
}

#[test]
fn continuation_attached_after_ready_runs_inline() {
    let a = make_ready_future(7);
    let b = a.then(|a| a.get() * 2, &ImmediateInvoker, Policy::empty());
    assert!(b.ready());
    assert_eq!(*b.get(), 14);
}

#[test]
fn when_all_over_vec_preserves_order() -> Result<()> {
    let pool = ThreadPool::new(2)?;
    let futures: Vec<_> = (1..=3)
        .map(|i| Future::spawn(move || i, &pool, Policy::empty()))
        .collect();

    let all = when_all(futures);
    let settled = all.get();
    assert_eq!(settled.len(), 3);
    for (idx, fut) in settled.iter().enumerate() {
        assert!(fut.ready());
        assert_eq!(*fut.get(), idx as i32 + 1);
    }
    Ok(())
}

#[test]
fn timed_wait_reports_timeout_then_ready() -> Result<()> {
    let pool = ThreadPool::new(1)?;
    let fut = Future::spawn(
        || {
            thread::sleep(Duration::from_millis(50));
            5
        },
        &pool,
        Policy::ASYNC,
    );

    assert_eq!(fut.wait_for(Duration::from_millis(1)), WaitStatus::Timeout);
    fut.wait();
    assert_eq!(*fut.get(), 5);
    assert_eq!(fut.wait_until(Instant::now()), WaitStatus::Ready);
    Ok(())
}

#[rstest]
#[case::plain(Policy::empty())]
#[case::deferred(Policy::DEFERRED)]
#[case::forced(Policy::ASYNC)]
#[case::both(Policy::ASYNC | Policy::DEFERRED)]
fn every_policy_settles(#[case] policy: Policy) -> Result<()> {
    let pool = ThreadPool::new(2)?;
    let fut = Future::spawn(|| 9, &pool, policy);
    assert_eq!(*fut.get(), 9);
    Ok(())
}

#[test]
fn body_runs_at_most_once_under_contention() {
    let pool = ManualPool::new();
    let count = Arc::new(AtomicUsize::new(0));
    let fut = {
        let count = Arc::clone(&count);
        Future::spawn(
            move || {
                count.fetch_add(1, Ordering::Relaxed);
                7
            },
            &pool,
            Policy::DEFERRED,
        )
    };

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let fut = fut.clone();
            let pool = pool.clone();
            thread::spawn(move || {
                pool.run_all();
                fut.wait();
                *fut.get()
            })
        })
        .collect();

    for thread in threads {
        assert_eq!(thread.join().unwrap(), 7);
    }
    assert_eq!(count.load(Ordering::Relaxed), 1);
}

#[test]
fn every_continuation_runs_exactly_once() {
    let pool = ManualPool::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let fut = Future::spawn(|| 1, &pool, Policy::empty());

    let attach = |fut: &Future<i32>| {
        let hits = Arc::clone(&hits);
        fut.then(
            move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            },
            &ImmediateInvoker,
            Policy::empty(),
        )
    };

    let before: Vec<_> = (0..16).map(|_| attach(&fut)).collect();
    pool.run_all();
    let after: Vec<_> = (0..16).map(|_| attach(&fut)).collect();

    for handle in before.iter().chain(after.iter()) {
        handle.wait();
    }
    assert_eq!(hits.load(Ordering::Relaxed), 32);
}

#[test]
fn racing_attach_and_completion_loses_no_continuations() {
    for _ in 0..64 {
        let pool = ManualPool::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let fut = Future::spawn(|| (), &pool, Policy::empty());

        let attacher = {
            let fut = fut.clone();
            let hits = Arc::clone(&hits);
            thread::spawn(move || {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let hits = Arc::clone(&hits);
                        fut.then(
                            move |_| {
                                hits.fetch_add(1, Ordering::Relaxed);
                            },
                            &ImmediateInvoker,
                            Policy::empty(),
                        )
                    })
                    .collect();
                for handle in &handles {
                    handle.wait();
                }
            })
        };
        let runner = {
            let pool = pool.clone();
            thread::spawn(move || {
                pool.run_all();
            })
        };

        attacher.join().unwrap();
        runner.join().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 8);
    }
}

#[test]
fn group_wait_implies_readiness() -> Result<()> {
    let pool = ThreadPool::new(2)?;
    let group = ConcurrentTaskGroup::new(pool.clone());

    let futures: Vec<_> = (0..16)
        .map(|i| Future::spawn(move || i, &group, Policy::empty()))
        .collect();

    group.wait();
    assert_eq!(group.outstanding_counter().load(Ordering::Acquire), 0);
    for (i, fut) in futures.iter().enumerate() {
        assert!(fut.ready());
        assert_eq!(*fut.get(), i);
    }
    Ok(())
}

#[test]
fn single_owner_group_waits_by_helping() -> Result<()> {
    let pool = ThreadPool::new(1)?;
    let group = TaskGroup::new(pool);
    let hits = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let hits = Arc::clone(&hits);
        Future::spawn(
            move || {
                hits.fetch_add(1, Ordering::Relaxed);
            },
            &group,
            Policy::ASYNC,
        );
    }

    group.wait();
    assert_eq!(hits.load(Ordering::Relaxed), 8);
    assert_eq!(group.pool().try_run_one(), false);
    Ok(())
}

#[test]
fn interception_captures_instead_of_running() {
    let interceptor = InterceptionInvoker::new();
    let fut = Future::spawn(|| 3, &interceptor, Policy::empty());
    assert!(!fut.ready());

    interceptor.take().expect("captured").run();
    assert!(fut.ready());
    assert_eq!(*fut.get(), 3);
}

#[test]
fn make_ready_is_immediate() {
    let fut = make_ready_future(String::from("ok"));
    assert!(fut.valid());
    assert!(fut.ready());
    assert_eq!(fut.get().as_str(), "ok");
    assert_eq!(fut.try_take().unwrap(), "ok");
}

#[test]
fn when_all_tuple_mixes_types() -> Result<()> {
    let pool = ThreadPool::new(2)?;
    let a = Future::spawn(|| 1, &pool, Policy::empty());
    let b = Future::spawn(|| String::from("two"), &pool, Policy::empty());

    let all = when_all_tuple((a, b));
    let (a, b) = all.get();
    assert_eq!(*a.get(), 1);
    assert_eq!(b.get().as_str(), "two");
    Ok(())
}

#[test]
fn when_all_empty_inputs_are_ready() {
    let none: Vec<Future<i32>> = Vec::new();
    let all = when_all(none);
    assert!(all.ready());
    assert!(all.get().is_empty());

    let unit = when_all_tuple(());
    assert!(unit.ready());
}

#[test]
fn when_all_keeps_failures_on_their_own_future() -> Result<()> {
    let pool = ThreadPool::new(1)?;
    let ok = Future::spawn(|| 1, &pool, Policy::empty());
    let bad: Future<i32> = Future::spawn(|| panic!("broken input"), &pool, Policy::empty());

    let all = when_all(vec![ok, bad]);
    let settled = all.get();

    assert_eq!(*settled[0].get(), 1);
    let err = catch_unwind(AssertUnwindSafe(|| *settled[1].get())).unwrap_err();
    let panic = err.downcast::<BodyPanic>().unwrap();
    assert_eq!(panic.message().as_deref(), Some("broken input"));
    Ok(())
}

#[test]
fn trivial_cells_use_the_small_classes() {
    let fut = make_ready_future(1u8);
    assert!(crate::alloc::small_in_use() >= 1);
    assert_eq!(*fut.get(), 1);
}

// Only these tests put cells on the heap; serialize them so the global
// balance counters stay meaningful under the parallel test runner.
static HEAP_BALANCE: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

#[test]
fn oversized_cells_use_the_heap_and_balance() {
    let _guard = HEAP_BALANCE.lock();
    let baseline = crate::alloc::heap_in_use();
    {
        let payload = [1u8; 512];
        let fut = Future::spawn(
            move || payload.iter().map(|&b| b as usize).sum::<usize>(),
            &ImmediateInvoker,
            Policy::empty(),
        );
        assert!(crate::alloc::heap_in_use() > baseline);
        assert_eq!(*fut.get(), 512);
    }
    assert_eq!(crate::alloc::heap_in_use(), baseline);
}

#[test]
fn handle_churn_frees_every_cell() {
    let _guard = HEAP_BALANCE.lock();
    let baseline = crate::alloc::heap_in_use();
    let pool = ManualPool::new();

    for _ in 0..32 {
        let payload = [7u8; 300];
        let fut = Future::spawn(move || payload[0], &pool, Policy::DEFERRED);
        let clones: Vec<_> = (0..4).map(|_| fut.clone()).collect();
        drop(clones);
        fut.wait();
        assert_eq!(*fut.get(), 7);
    }

    pool.run_all();
    assert_eq!(crate::alloc::heap_in_use(), baseline);
}
