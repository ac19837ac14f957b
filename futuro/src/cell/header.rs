use crate::alloc::AllocTag;
use crate::event::CompletionEvent;
use crate::job::JobHeader;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU32};

use super::layout::CellVtable;
use super::raw::CELL_JOB_VTABLE;
use super::status::Status;

/// Hot shared state of a future cell.
///
/// The leading `job` header lets a cell ride through an executor as a
/// plain `Job` with no adapter allocation: running that job runs the cell,
/// dropping it releases the scheduled-run count.
#[repr(C)]
pub(crate) struct Header {
    pub(super) job: JobHeader,

    /// Typed operations reachable from the untyped handle.
    pub(super) vtable: &'static CellVtable,

    /// Tri-state lifecycle; waiters block on the event until Ready.
    pub(super) status: CompletionEvent,

    /// One count per live handle, plus one for the pending scheduled run.
    pub(super) refs: AtomicU32,

    /// LIFO chain of continuation nodes. Null when empty.
    pub(super) then_head: AtomicPtr<JobHeader>,

    /// Outstanding-task counter of the owning group. Decremented exactly
    /// once, after the Ready store, so a group waiter observing zero may
    /// rely on the future reporting ready.
    pub(super) group_counter: Option<Arc<AtomicI32>>,

    /// Waiters may run the body on their own thread when set.
    pub(super) allow_inline: bool,

    /// How the cell frees itself.
    pub(super) tag: AllocTag,
}

impl Header {
    pub(super) fn new(
        vtable: &'static CellVtable,
        status: Status,
        refs: u32,
        allow_inline: bool,
        group_counter: Option<Arc<AtomicI32>>,
        tag: AllocTag,
    ) -> Header {
        Header {
            job: JobHeader {
                vtable: &CELL_JOB_VTABLE,
            },
            vtable,
            status: CompletionEvent::new(status.as_u32()),
            refs: AtomicU32::new(refs),
            then_head: AtomicPtr::new(ptr::null_mut()),
            group_counter,
            allow_inline,
            tag,
        }
    }
}
