//! Type-erased one-shot callables.
//!
//! A [`Job`] owns exactly one invocation. The callable is erased behind a
//! header-plus-vtable pair so executors can queue heterogeneous work
//! through a thin pointer; storage comes from the size-class slabs because
//! jobs are small and short-lived. Future cells and continuation nodes
//! start with a [`JobHeader`] of their own, which lets them ride through an
//! executor without any extra allocation.

use crate::alloc::{self, AllocTag};
use std::alloc::Layout;
use std::mem::{self, ManuallyDrop};
use std::ptr::NonNull;

#[repr(C)]
pub(crate) struct JobHeader {
    pub(crate) vtable: &'static JobVtable,
}

pub(crate) struct JobVtable {
    /// Runs the callable and releases the allocation.
    pub(crate) run: unsafe fn(NonNull<JobHeader>),
    /// Releases the allocation without running the callable.
    pub(crate) drop: unsafe fn(NonNull<JobHeader>),
}

/// An owned, type-erased, one-shot callable.
///
/// Dropping a `Job` without running it releases whatever the callable
/// owned; each job is consumed exactly once either way.
pub struct Job {
    ptr: NonNull<JobHeader>,
}

// A job owns its callable outright, and construction requires the callable
// to be Send.
unsafe impl Send for Job {}

impl Job {
    pub(crate) fn new<F>(f: F) -> Job
    where
        F: FnOnce() + Send + 'static,
    {
        let layout = Layout::new::<JobCell<F>>();
        let (ptr, tag) = alloc::alloc_block(layout);
        let cell = ptr.cast::<JobCell<F>>();
        unsafe {
            cell.as_ptr().write(JobCell {
                header: JobHeader {
                    vtable: closure_vtable::<F>(),
                },
                tag,
                f: ManuallyDrop::new(f),
            });

            // The header must sit at offset zero: the erased pointer is
            // cast back and forth between the cell and its header.
            #[cfg(debug_assertions)]
            assert_eq!(
                &cell.as_ref().header as *const JobHeader as usize,
                cell.as_ptr() as usize,
            );
        }
        Job { ptr: cell.cast() }
    }

    /// Adopts an erased callable by pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a live object beginning with a [`JobHeader`]
    /// whose vtable manages that object, and the caller must hand over its
    /// ownership of one invocation.
    pub(crate) unsafe fn from_raw(ptr: NonNull<JobHeader>) -> Job {
        Job { ptr }
    }

    /// Runs the callable, consuming the job.
    pub fn run(self) {
        let ptr = self.ptr;
        mem::forget(self);
        unsafe { ((ptr.as_ref().vtable).run)(ptr) }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        unsafe { ((self.ptr.as_ref().vtable).drop)(self.ptr) }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "Job({:p})", self.ptr)
    }
}

#[repr(C)]
struct JobCell<F> {
    header: JobHeader,
    tag: AllocTag,
    f: ManuallyDrop<F>,
}

fn closure_vtable<F: FnOnce() + Send + 'static>() -> &'static JobVtable {
    &JobVtable {
        run: run_closure::<F>,
        drop: drop_closure::<F>,
    }
}

unsafe fn run_closure<F: FnOnce() + Send + 'static>(ptr: NonNull<JobHeader>) {
    let cell = ptr.cast::<JobCell<F>>();
    let (f, tag) = unsafe {
        let cell = cell.as_ref();
        (ManuallyDrop::into_inner(std::ptr::read(&cell.f)), cell.tag)
    };
    // Free the cell before running so the callable may outlast its storage
    // (it can requeue, block, or drop the world).
    unsafe { alloc::dealloc_block(cell.cast(), tag, Layout::new::<JobCell<F>>()) };
    f();
}

unsafe fn drop_closure<F: FnOnce() + Send + 'static>(ptr: NonNull<JobHeader>) {
    let cell = ptr.cast::<JobCell<F>>();
    let (f, tag) = unsafe {
        let cell = cell.as_ref();
        (ManuallyDrop::into_inner(std::ptr::read(&cell.f)), cell.tag)
    };
    unsafe { alloc::dealloc_block(cell.cast(), tag, Layout::new::<JobCell<F>>()) };
    drop(f);
}
