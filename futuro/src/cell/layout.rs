#![allow(unsafe_op_in_unsafe_fn)]

use crate::alloc::{self, MAX_SMALL_SIZE};
use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use static_assertions::const_assert;

use super::failure::Failure;
use super::harness::Harness;
use super::header::Header;
use super::raw::RawFuture;
use super::status::Status;

/// The concrete cell behind a future handle.
///
/// `header` must stay the first field: the cell is referenced as both
/// `*mut FutureCell` and `*mut Header`.
#[repr(C)]
pub(super) struct FutureCell<F, T> {
    pub(super) header: Header,
    /// Body before the run, settled outcome after.
    pub(super) stage: UnsafeCell<Stage<F, T>>,
}

/// Either the body, the settled outcome, or nothing.
///
/// The success value is dropped exactly once: with the cell, or earlier if
/// a sole owner moved it out. It is never constructed when the body
/// panicked.
pub(super) enum Stage<F, T> {
    NotStarted(F),
    Finished(Result<T, Failure>),
    Consumed,
}

// A trivial cell must fit the small-buffer path; only the body or result
// payload may push a cell onto the heap.
const_assert!(size_of::<FutureCell<fn(), ()>>() <= MAX_SMALL_SIZE);

/// Typed operations reachable from an untyped cell handle.
pub(crate) struct CellVtable {
    /// Runs the body if the caller wins the NotStarted -> Running race.
    pub(super) try_run: unsafe fn(NonNull<Header>) -> bool,
    /// Drops the cell in place and returns its storage.
    pub(super) dealloc: unsafe fn(NonNull<Header>),
    /// Pointer to the settled value; re-raises a stored failure.
    pub(super) result: unsafe fn(NonNull<Header>) -> *const (),
    /// Moves the settled value out into `dst`; re-raises a stored failure.
    pub(super) take_result: unsafe fn(NonNull<Header>, *mut ()),
}

fn vtable<F, T>() -> &'static CellVtable
where
    F: FnOnce() -> T,
{
    &CellVtable {
        try_run: try_run::<F, T>,
        dealloc: dealloc::<F, T>,
        result: result::<F, T>,
        take_result: take_result::<F, T>,
    }
}

/// Allocates a pending cell holding `body`.
///
/// The cell starts with two reference counts: one for the handle returned
/// to the caller, one for the scheduled run.
pub(crate) fn new_cell<F, T>(
    body: F,
    allow_inline: bool,
    group_counter: Option<Arc<AtomicI32>>,
) -> RawFuture
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    alloc_cell::<F, T>(
        Stage::NotStarted(body),
        Status::NotStarted,
        2,
        allow_inline,
        group_counter,
    )
}

/// Allocates a cell that is already settled: single reference count, no
/// body, nothing scheduled.
pub(crate) fn new_ready_cell<T>(value: T) -> RawFuture
where
    T: Send + 'static,
{
    alloc_cell::<fn() -> T, T>(Stage::Finished(Ok(value)), Status::Ready, 1, false, None)
}

fn alloc_cell<F, T>(
    stage: Stage<F, T>,
    status: Status,
    refs: u32,
    allow_inline: bool,
    group_counter: Option<Arc<AtomicI32>>,
) -> RawFuture
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let layout = Layout::new::<FutureCell<F, T>>();
    let (ptr, tag) = alloc::alloc_block(layout);
    let cell = ptr.cast::<FutureCell<F, T>>();
    unsafe {
        cell.as_ptr().write(FutureCell {
            header: Header::new(vtable::<F, T>(), status, refs, allow_inline, group_counter, tag),
            stage: UnsafeCell::new(stage),
        });

        // Both erased views hinge on the layout: the header at offset zero
        // of the cell, the job header at offset zero of the header.
        #[cfg(debug_assertions)]
        {
            assert_eq!(
                &cell.as_ref().header as *const Header as usize,
                cell.as_ptr() as usize,
            );
            assert_eq!(
                &cell.as_ref().header.job as *const crate::job::JobHeader as usize,
                cell.as_ptr() as usize,
            );
        }

        RawFuture::from_header(cell.cast())
    }
}

/// Claims the NotStarted -> Running transition. On success runs the body,
/// publishes the outcome, signals the group and drains the continuation
/// chain; returns true iff this call performed the run.
unsafe fn try_run<F, T>(ptr: NonNull<Header>) -> bool
where
    F: FnOnce() -> T,
{
    let raw = RawFuture::from_header(ptr);
    let header = ptr.as_ref();
    let status = header.status.intrusive();

    let mut observed = status.load(Ordering::Relaxed);
    while observed == Status::NotStarted.as_u32() {
        match status.compare_exchange_weak(
            observed,
            Status::Running.as_u32(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                Harness::<F, T>::from_header(ptr).run_body();
                // Release store: a reader that observes Ready also
                // observes the settled stage.
                header.status.notify(Status::Ready.as_u32());
                if let Some(counter) = &header.group_counter {
                    // Strictly after the status store, so a group waiter
                    // that sees the counter hit zero sees readiness too.
                    counter.fetch_sub(1, Ordering::Release);
                }
                raw.drain_then_chain();
                return true;
            }
            Err(current) => observed = current,
        }
    }
    false
}

unsafe fn dealloc<F, T>(ptr: NonNull<Header>) {
    Harness::<F, T>::from_header(ptr).dealloc();
}

unsafe fn result<F, T>(ptr: NonNull<Header>) -> *const () {
    Harness::<F, T>::from_header(ptr).result_ptr() as *const ()
}

unsafe fn take_result<F, T>(ptr: NonNull<Header>, dst: *mut ()) {
    Harness::<F, T>::from_header(ptr).take_result(dst.cast::<T>());
}
