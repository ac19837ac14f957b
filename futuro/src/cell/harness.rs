#![allow(unsafe_op_in_unsafe_fn)]

use crate::alloc;
use crate::job::Job;
use std::alloc::Layout;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;

use super::failure::Failure;
use super::header::Header;
use super::layout::{FutureCell, Stage};

/// Typed view of a cell.
pub(super) struct Harness<F, T> {
    cell: NonNull<FutureCell<F, T>>,
}

impl<F, T> Harness<F, T> {
    /// # Safety
    ///
    /// `ptr` must be the header of a live `FutureCell<F, T>`.
    pub(super) unsafe fn from_header(ptr: NonNull<Header>) -> Harness<F, T> {
        Harness { cell: ptr.cast() }
    }

    fn header(&self) -> &Header {
        unsafe { &self.cell.as_ref().header }
    }

    fn stage_ptr(&self) -> *mut Stage<F, T> {
        unsafe { self.cell.as_ref().stage.get() }
    }

    /// Pointer to the settled value; re-raises a stored failure.
    ///
    /// # Safety
    ///
    /// The cell must be Ready and the call must happen-after the Ready
    /// store.
    pub(super) unsafe fn result_ptr(&self) -> *const T {
        match &*self.stage_ptr() {
            Stage::Finished(Ok(value)) => value as *const T,
            Stage::Finished(Err(failure)) => failure.resurface(),
            _ => unreachable!("result read before completion"),
        }
    }

    /// Moves the settled value into `dst`; re-raises a stored failure.
    ///
    /// # Safety
    ///
    /// Same as [`Harness::result_ptr`], plus exclusive ownership of the
    /// cell (sole handle, no queued run).
    pub(super) unsafe fn take_result(&self, dst: *mut T) {
        match ptr::replace(self.stage_ptr(), Stage::Consumed) {
            Stage::Finished(Ok(value)) => dst.write(value),
            Stage::Finished(Err(failure)) => failure.resurface(),
            _ => unreachable!("result taken before completion"),
        }
    }

    /// Drops the cell in place and returns its storage to the allocator
    /// that produced it.
    pub(super) fn dealloc(self) {
        let tag = self.header().tag;
        // A cell that never ran may still hold parked continuations;
        // release them without running.
        let head = self
            .header()
            .then_head
            .swap(ptr::null_mut(), Ordering::Acquire);
        if let Some(head) = NonNull::new(head) {
            drop(unsafe { Job::from_raw(head) });
        }
        unsafe {
            let layout = Layout::new::<FutureCell<F, T>>();
            ptr::drop_in_place(self.cell.as_ptr());
            alloc::dealloc_block(self.cell.cast(), tag, layout);
        }
    }
}

impl<F, T> Harness<F, T>
where
    F: FnOnce() -> T,
{
    /// Consumes the body and settles the stage. Caller must hold the
    /// Running transition; nothing else touches the stage while it runs.
    pub(super) fn run_body(&self) {
        let stage = self.stage_ptr();
        let body = match unsafe { ptr::replace(stage, Stage::Consumed) } {
            Stage::NotStarted(body) => body,
            _ => unreachable!("body ran twice"),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(body));
        unsafe { stage.write(Stage::Finished(outcome.map_err(Failure::new))) };
    }
}
