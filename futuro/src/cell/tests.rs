use crate::test_utils::ManualPool;
use crate::{BodyPanic, Future, ImmediateInvoker, Policy, make_ready_future};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn failure_resurfaces_on_every_read() {
    let fut: Future<i32> = Future::spawn(|| panic!("kaboom"), &ImmediateInvoker, Policy::empty());
    assert!(fut.ready());

    for _ in 0..2 {
        let err = catch_unwind(AssertUnwindSafe(|| *fut.get())).unwrap_err();
        let panic = err.downcast::<BodyPanic>().unwrap();
        assert_eq!(panic.message().as_deref(), Some("kaboom"));
    }
}

#[test]
fn continuation_reads_propagate_the_original_payload() {
    let bad: Future<i32> =
        Future::spawn(|| panic!("root cause"), &ImmediateInvoker, Policy::empty());
    let chained = bad.then(|bad| *bad.get() + 1, &ImmediateInvoker, Policy::empty());

    let err = catch_unwind(AssertUnwindSafe(|| *chained.get())).unwrap_err();
    let panic = err.downcast::<BodyPanic>().unwrap();
    assert_eq!(panic.message().as_deref(), Some("root cause"));
}

#[test]
fn owned_panic_payloads_survive_without_a_message() {
    #[derive(Debug)]
    struct Custom(#[allow(dead_code)] u32);

    let fut: Future<i32> = Future::spawn(
        || std::panic::panic_any(Custom(9)),
        &ImmediateInvoker,
        Policy::empty(),
    );
    let err = catch_unwind(AssertUnwindSafe(|| *fut.get())).unwrap_err();
    let panic = err.downcast::<BodyPanic>().unwrap();
    assert!(panic.message().is_none());
}

#[test]
fn try_take_requires_sole_ownership() {
    let fut = make_ready_future(vec![1, 2, 3]);
    let clone = fut.clone();

    let fut = fut.try_take().unwrap_err();
    drop(clone);
    assert_eq!(fut.try_take().unwrap(), vec![1, 2, 3]);
}

#[test]
fn invalid_handles_report_and_panic() {
    let fut = Future::<i32>::default();
    assert!(!fut.valid());
    assert!(catch_unwind(AssertUnwindSafe(|| fut.ready())).is_err());
}

#[test]
fn wait_without_deferred_blocks_for_the_runner() {
    let pool = ManualPool::new();
    let ran = Arc::new(AtomicBool::new(false));
    let fut = {
        let ran = Arc::clone(&ran);
        Future::spawn(
            move || {
                ran.store(true, Ordering::Relaxed);
                1
            },
            &pool,
            Policy::empty(),
        )
    };

    let runner = {
        let pool = pool.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            pool.run_all();
        })
    };

    // No inline stealing without DEFERRED: the body must run elsewhere.
    fut.wait();
    assert!(ran.load(Ordering::Relaxed));
    assert_eq!(*fut.get(), 1);
    runner.join().unwrap();
}

#[test]
fn forced_async_continuation_is_queued() {
    let pool = ManualPool::new();
    let a = make_ready_future(5);
    let b = a.then(|a| *a.get() + 1, &pool, Policy::ASYNC);

    assert!(!b.ready());
    assert_eq!(pool.run_all(), 1);
    assert_eq!(*b.get(), 6);
}

#[test]
fn unran_cells_release_their_body() {
    let witness = Arc::new(());
    let pool = ManualPool::new();
    {
        let witness = Arc::clone(&witness);
        let _fut = Future::spawn(
            move || {
                let _keep = &witness;
            },
            &pool,
            Policy::empty(),
        );
    }

    // The handle is gone; only the queued job keeps the cell alive.
    drop(pool);
    assert_eq!(Arc::strong_count(&witness), 1);
}

#[test]
fn stolen_bodies_leave_a_harmless_queue_entry() {
    let pool = ManualPool::new();
    let fut = Future::spawn(|| 11, &pool, Policy::DEFERRED);

    assert!(fut.wait_for(Duration::from_millis(50)).is_ready());
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.run_all(), 1);
    assert_eq!(*fut.get(), 11);
}
