#![allow(unsafe_op_in_unsafe_fn)]

use crate::executor::Executor;
use crate::job::{Job, JobHeader, JobVtable};
use crate::policy::WaitStatus;
use std::ptr::{self, NonNull};
use std::sync::atomic::{self, Ordering};
use std::time::{Duration, Instant};

use super::chain;
use super::header::Header;
use super::status::Status;

/// Untyped handle to a future cell.
///
/// A plain pointer copy; reference counts are managed explicitly by the
/// owners (handles, queued jobs, continuation nodes).
#[derive(Clone, Copy)]
pub(crate) struct RawFuture {
    ptr: NonNull<Header>,
}

/// Vtable stamped into every cell's leading job header. Running the job
/// runs the cell; dropping it releases the scheduled-run count.
pub(super) static CELL_JOB_VTABLE: JobVtable = JobVtable {
    run: run_cell,
    drop: release_cell,
};

unsafe fn run_cell(ptr: NonNull<JobHeader>) {
    RawFuture::from_header(ptr.cast()).run();
}

unsafe fn release_cell(ptr: NonNull<JobHeader>) {
    RawFuture::from_header(ptr.cast()).ref_dec();
}

impl RawFuture {
    /// # Safety
    ///
    /// `ptr` must be the header of a live cell.
    pub(crate) unsafe fn from_header(ptr: NonNull<Header>) -> RawFuture {
        RawFuture { ptr }
    }

    pub(crate) fn header_ptr(&self) -> NonNull<Header> {
        self.ptr
    }

    fn header(&self) -> &Header {
        unsafe { self.ptr.as_ref() }
    }

    /// Non-blocking readiness hint. Relaxed: pair with `wait` for a read
    /// that synchronizes with the value.
    pub(crate) fn ready(&self) -> bool {
        self.header().status.intrusive().load(Ordering::Relaxed) == Status::Ready.as_u32()
    }

    pub(crate) fn refs(&self) -> u32 {
        self.header().refs.load(Ordering::Acquire)
    }

    pub(crate) fn ref_inc(&self) {
        self.header().refs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ref_dec(&self) {
        if self.header().refs.fetch_sub(1, Ordering::Release) == 1 {
            // Synchronize with every prior release before tearing down.
            atomic::fence(Ordering::Acquire);
            let dealloc = self.header().vtable.dealloc;
            unsafe { dealloc(self.ptr) };
        }
    }

    /// Runs the body if nobody has yet. True iff this call performed it.
    pub(crate) fn try_run(&self) -> bool {
        unsafe { (self.header().vtable.try_run)(self.ptr) }
    }

    /// Scheduled entry point: attempt the run, then release the count the
    /// scheduler was holding.
    pub(crate) fn run(self) {
        self.try_run();
        self.ref_dec();
    }

    /// Reinterprets the cell as a queueable job.
    ///
    /// # Safety
    ///
    /// The caller transfers ownership of one reference count to the job.
    pub(crate) unsafe fn as_job(&self) -> Job {
        Job::from_raw(self.ptr.cast::<JobHeader>())
    }

    fn wait_common(&self, allow_inline: bool) -> bool {
        let observed = self.header().status.intrusive().load(Ordering::Acquire);
        observed == Status::Ready.as_u32() || (allow_inline && self.try_run())
    }

    pub(crate) fn wait(&self) {
        if self.wait_common(self.header().allow_inline) {
            return;
        }
        self.header().status.wait(Status::Ready.as_u32());
    }

    pub(crate) fn wait_for(&self, timeout: Duration) -> WaitStatus {
        if self.wait_common(self.header().allow_inline)
            || self
                .header()
                .status
                .wait_for(Status::Ready.as_u32(), timeout)
        {
            WaitStatus::Ready
        } else {
            WaitStatus::Timeout
        }
    }

    pub(crate) fn wait_until(&self, deadline: Instant) -> WaitStatus {
        if self.wait_common(self.header().allow_inline)
            || self
                .header()
                .status
                .wait_until(Status::Ready.as_u32(), deadline)
        {
            WaitStatus::Ready
        } else {
            WaitStatus::Timeout
        }
    }

    /// Pointer to the settled value; re-raises a stored failure.
    ///
    /// # Safety
    ///
    /// `T` must be the cell's value type, the cell must be Ready, and the
    /// read must happen-after the Ready store.
    pub(crate) unsafe fn result_ptr<T>(&self) -> *const T {
        (self.header().vtable.result)(self.ptr) as *const T
    }

    /// Moves the settled value out into `dst`.
    ///
    /// # Safety
    ///
    /// Same as [`RawFuture::result_ptr`], plus exclusive ownership of the
    /// cell.
    pub(crate) unsafe fn take_result<T>(&self, dst: *mut T) {
        (self.header().vtable.take_result)(self.ptr, dst.cast());
    }

    /// Hands `target` to `executor` now if this cell is Ready, otherwise
    /// parks it on the continuation chain.
    pub(crate) fn attach_or_execute<E>(&self, target: RawFuture, executor: E, force: bool)
    where
        E: Executor + Clone,
    {
        let header = self.header();
        if header.status.intrusive().load(Ordering::Acquire) == Status::Ready.as_u32() {
            chain::dispatch(target, &executor, force);
            return;
        }

        let node = chain::new_node(target, executor, force);
        let mut expected = header.then_head.load(Ordering::Acquire);
        loop {
            unsafe { chain::set_next(node, expected) };
            match header.then_head.compare_exchange_weak(
                expected,
                node.as_ptr(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => expected = current,
            }
        }

        // The cell may have settled while the node was being parked; the
        // runner could have swept an empty chain already, so sweep again.
        if header.status.intrusive().load(Ordering::Acquire) == Status::Ready.as_u32() {
            self.drain_then_chain();
        }
    }

    /// Sweeps the continuation chain until it observes it empty. A
    /// detached batch is owned exclusively by the thread that swapped it
    /// out; nodes pushed during the sweep are picked up on the next lap.
    pub(crate) fn drain_then_chain(&self) {
        let then_head = &self.header().then_head;
        let mut head = then_head.load(Ordering::Acquire);
        while !head.is_null() {
            match then_head.compare_exchange_weak(
                head,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(batch) => unsafe { Job::from_raw(NonNull::new_unchecked(batch)).run() },
                Err(current) => head = current,
            }
        }
    }
}
