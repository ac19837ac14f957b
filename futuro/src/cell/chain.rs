#![allow(unsafe_op_in_unsafe_fn)]

//! Continuation chain nodes.
//!
//! A node is a job whose run step hands its target cell to the captured
//! executor and then runs the rest of the chain. Nodes are pushed with a
//! CAS loop and drained in batches; order within a batch follows the
//! push order in reverse, but attachment races make the overall order
//! unspecified.

use crate::alloc::{self, AllocTag};
use crate::executor::Executor;
use crate::job::{Job, JobHeader, JobVtable};
use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use super::raw::RawFuture;

/// Fields shared by every node regardless of executor type. Must stay the
/// leading fields of `ChainCell` so the chain can be linked untyped.
#[repr(C)]
struct NodePrefix {
    header: JobHeader,
    tag: AllocTag,
    next: *mut JobHeader,
}

#[repr(C)]
struct ChainCell<E> {
    prefix: NodePrefix,
    /// Downstream cell; the node holds its scheduled-run count.
    target: RawFuture,
    force: bool,
    executor: ManuallyDrop<E>,
}

/// Submits `target` for execution, honoring the forced-queuing bit.
pub(super) fn dispatch<E: Executor>(target: RawFuture, executor: &E, force: bool) {
    let job = unsafe { target.as_job() };
    if force {
        executor.schedule_forced(job);
    } else {
        executor.schedule(job);
    }
}

pub(super) fn new_node<E>(target: RawFuture, executor: E, force: bool) -> NonNull<JobHeader>
where
    E: Executor + Clone,
{
    let layout = Layout::new::<ChainCell<E>>();
    let (ptr, tag) = alloc::alloc_block(layout);
    let cell = ptr.cast::<ChainCell<E>>();
    unsafe {
        cell.as_ptr().write(ChainCell {
            prefix: NodePrefix {
                header: JobHeader {
                    vtable: node_vtable::<E>(),
                },
                tag,
                next: ptr::null_mut(),
            },
            target,
            force,
            executor: ManuallyDrop::new(executor),
        });

        // The job header must sit at offset zero: the chain is linked and
        // drained through erased `JobHeader` pointers.
        #[cfg(debug_assertions)]
        assert_eq!(
            &cell.as_ref().prefix.header as *const JobHeader as usize,
            cell.as_ptr() as usize,
        );
    }
    cell.cast()
}

/// Links `node` in front of `next`.
///
/// # Safety
///
/// The node must not be published to the chain yet.
pub(super) unsafe fn set_next(node: NonNull<JobHeader>, next: *mut JobHeader) {
    (*node.cast::<NodePrefix>().as_ptr()).next = next;
}

fn node_vtable<E: Executor + Clone>() -> &'static JobVtable {
    &JobVtable {
        run: run_node::<E>,
        drop: drop_node::<E>,
    }
}

unsafe fn run_node<E: Executor + Clone>(ptr: NonNull<JobHeader>) {
    let (target, executor, force, next) = consume::<E>(ptr);
    dispatch(target, &executor, force);
    drop(executor);
    if let Some(next) = NonNull::new(next) {
        Job::from_raw(next).run();
    }
}

unsafe fn drop_node<E: Executor + Clone>(ptr: NonNull<JobHeader>) {
    let (target, executor, _force, next) = consume::<E>(ptr);
    drop(executor);
    // Release the scheduled-run count the node was holding for its target.
    drop(target.as_job());
    if let Some(next) = NonNull::new(next) {
        drop(Job::from_raw(next));
    }
}

/// Reads the node out and frees its storage.
unsafe fn consume<E>(ptr: NonNull<JobHeader>) -> (RawFuture, E, bool, *mut JobHeader) {
    let cell = ptr.cast::<ChainCell<E>>();
    let (target, executor, force, next, tag) = {
        let cell = cell.as_ref();
        (
            cell.target,
            ManuallyDrop::into_inner(ptr::read(&cell.executor)),
            cell.force,
            cell.prefix.next,
            cell.prefix.tag,
        )
    };
    alloc::dealloc_block(cell.cast(), tag, Layout::new::<ChainCell<E>>());
    (target, executor, force, next)
}
