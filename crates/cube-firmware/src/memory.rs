//! PSRAM placement for the history rings

use core::alloc::Layout;
use core::ptr::NonNull;

use cube_core::history::RingMemory;
use esp_alloc::{HEAP, MemoryCapability};

/// Serves ring storage from the external PSRAM region only.
///
/// A plain global allocation takes the first region with room, which is
/// internal DRAM while it lasts. Rings that do not fit in PSRAM fail to
/// allocate instead of eating into the internal heap.
pub struct PsramMemory;

// SAFETY: blocks come from the global `HEAP`, so dropping the ring's `Box`
// hands them back to the region they were carved from.
unsafe impl RingMemory for PsramMemory {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // SAFETY: `RingMemory` callers never pass a zero-sized layout.
        NonNull::new(unsafe { HEAP.alloc_caps(MemoryCapability::External.into(), layout) })
    }
}
