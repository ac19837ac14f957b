//! Size-class storage for future cells, jobs and continuation nodes.
//!
//! Objects whose size rounds up to a power of two of at most 256 bytes are
//! served from per-class free lists; anything larger falls back to the
//! global aligned heap. Class blocks are aligned to their own size, so any
//! object that fits a class also has its alignment satisfied. Freed blocks
//! are recycled process-wide and only returned to the OS at process exit.

use parking_lot::Mutex;
use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const MAX_SMALL_SIZE: usize = 256;
const MIN_CLASS_SIZE: usize = 16;
const NUM_CLASSES: usize = 5; // 16, 32, 64, 128, 256

/// How a block was obtained, and therefore how it must be returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocTag {
    /// From the free list of the given class index.
    Small(u8),
    /// From the global aligned heap.
    Heap,
}

struct Block(NonNull<u8>);

// Blocks are raw storage with no owner while parked on a free list.
unsafe impl Send for Block {}

struct SlabClass {
    free: Mutex<Vec<Block>>,
    in_use: AtomicUsize,
}

impl SlabClass {
    const fn new() -> Self {
        SlabClass {
            free: Mutex::new(Vec::new()),
            in_use: AtomicUsize::new(0),
        }
    }
}

static CLASSES: [SlabClass; NUM_CLASSES] = [
    SlabClass::new(),
    SlabClass::new(),
    SlabClass::new(),
    SlabClass::new(),
    SlabClass::new(),
];

static HEAP_IN_USE: AtomicUsize = AtomicUsize::new(0);

const fn class_size(class: usize) -> usize {
    MIN_CLASS_SIZE << class
}

/// The class index serving `layout`, or `None` when only the heap will do.
pub(crate) fn class_for(layout: Layout) -> Option<usize> {
    let size = layout.size().max(MIN_CLASS_SIZE).next_power_of_two();
    if size <= MAX_SMALL_SIZE && layout.align() <= size {
        Some(size.trailing_zeros() as usize - MIN_CLASS_SIZE.trailing_zeros() as usize)
    } else {
        None
    }
}

pub(crate) fn alloc_block(layout: Layout) -> (NonNull<u8>, AllocTag) {
    match class_for(layout) {
        Some(class) => {
            let slab = &CLASSES[class];
            slab.in_use.fetch_add(1, Ordering::Relaxed);
            let recycled = slab.free.lock().pop();
            let ptr = recycled.map(|b| b.0).unwrap_or_else(|| fresh_block(class));
            (ptr, AllocTag::Small(class as u8))
        }
        None => {
            // Safety: callers allocate for concrete types, so the layout has
            // non-zero size.
            let ptr = unsafe { alloc(layout) };
            let Some(ptr) = NonNull::new(ptr) else {
                handle_alloc_error(layout);
            };
            HEAP_IN_USE.fetch_add(1, Ordering::Relaxed);
            (ptr, AllocTag::Heap)
        }
    }
}

/// Returns a block obtained from [`alloc_block`].
///
/// # Safety
///
/// `ptr` and `tag` must come from the same `alloc_block` call, `layout` must
/// be the layout that call was given, and the block must not be used again.
pub(crate) unsafe fn dealloc_block(ptr: NonNull<u8>, tag: AllocTag, layout: Layout) {
    match tag {
        AllocTag::Small(class) => {
            let slab = &CLASSES[class as usize];
            slab.free.lock().push(Block(ptr));
            slab.in_use.fetch_sub(1, Ordering::Relaxed);
        }
        AllocTag::Heap => {
            unsafe { dealloc(ptr.as_ptr(), layout) };
            HEAP_IN_USE.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

fn fresh_block(class: usize) -> NonNull<u8> {
    let size = class_size(class);
    // Size-aligned blocks satisfy any type that fits the class.
    let layout = Layout::from_size_align(size, size).expect("class layout");
    let ptr = unsafe { alloc(layout) };
    match NonNull::new(ptr) {
        Some(ptr) => ptr,
        None => handle_alloc_error(layout),
    }
}

/// Number of small blocks currently handed out across all classes.
pub(crate) fn small_in_use() -> usize {
    CLASSES
        .iter()
        .map(|c| c.in_use.load(Ordering::Relaxed))
        .sum()
}

/// Number of heap allocations currently handed out.
pub(crate) fn heap_in_use() -> usize {
    HEAP_IN_USE.load(Ordering::Relaxed)
}
