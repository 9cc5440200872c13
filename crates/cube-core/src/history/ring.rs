extern crate alloc;
use alloc::boxed::Box;

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::errors::HistoryError;

/// Where ring storage comes from.
///
/// # Safety
///
/// `allocate` is only called with a non-zero-sized layout. A returned block
/// must be valid for that layout and must be releasable through the global
/// allocator with the same layout, since rings free their slots through
/// `Box`.
pub unsafe trait RingMemory {
    /// A block for `layout`, or `None` if this source cannot provide one.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;
}

/// Ring storage from the global allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalMemory;

// SAFETY: blocks come straight from the global allocator.
unsafe impl RingMemory for GlobalMemory {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // SAFETY: callers never pass a zero-sized layout
        NonNull::new(unsafe { alloc::alloc::alloc(layout) })
    }
}

/// Fixed-capacity circular buffer over a boxed slice.
///
/// Live items occupy `[(head - len) mod capacity, head)` in insertion order.
/// Once full, each push overwrites the oldest item. The slice is allocated
/// exactly once and never grows.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[T]>,
    /// Next write position
    head: usize,
    len: usize,
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::unallocated()
    }
}

impl<T> RingBuffer<T> {
    /// A ring with no storage. Pushes are dropped until it is replaced by
    /// an allocated one.
    pub fn unallocated() -> Self {
        Self {
            slots: Box::default(),
            head: 0,
            len: 0,
        }
    }

    /// Allocate `capacity` default-initialized slots from the global
    /// allocator.
    pub fn allocate(capacity: usize) -> Result<Self, HistoryError>
    where
        T: Default,
    {
        Self::allocate_in(capacity, &GlobalMemory)
    }

    /// Allocate `capacity` default-initialized slots from `memory`.
    ///
    /// Allocation failure is reported instead of aborting, and nothing is
    /// taken from any other source.
    pub fn allocate_in(capacity: usize, memory: &dyn RingMemory) -> Result<Self, HistoryError>
    where
        T: Default,
    {
        let bytes = capacity.saturating_mul(core::mem::size_of::<T>());
        let layout =
            Layout::array::<T>(capacity).map_err(|_| HistoryError::AllocationFailed { bytes })?;

        if layout.size() == 0 {
            return Ok(Self {
                slots: (0..capacity).map(|_| T::default()).collect(),
                head: 0,
                len: 0,
            });
        }

        let block = memory
            .allocate(layout)
            .ok_or(HistoryError::AllocationFailed { bytes })?
            .cast::<T>();

        // SAFETY: `block` is valid for `capacity` values of `T` and every slot
        // is written before the slice is formed. `RingMemory` guarantees the
        // block can be freed by the global allocator when the box drops.
        let slots = unsafe {
            for i in 0..capacity {
                block.as_ptr().add(i).write(T::default());
            }
            Box::from_raw(core::ptr::slice_from_raw_parts_mut(block.as_ptr(), capacity))
        };

        Ok(Self {
            slots,
            head: 0,
            len: 0,
        })
    }

    pub fn is_allocated(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an item, overwriting the oldest once full. No-op without storage.
    pub fn push(&mut self, item: T) {
        let capacity = self.slots.len();
        if capacity == 0 {
            return;
        }
        self.slots[self.head] = item;
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Most recently pushed item.
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.slots.len();
        self.slots.get((self.head + capacity - 1) % capacity)
    }

    /// Live items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.slots.len().max(1);
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).map(move |i| &self.slots[(start + i) % capacity])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unallocated_ring_drops_pushes() {
        let mut ring = RingBuffer::<u32>::unallocated();
        ring.push(1);
        assert!(ring.is_empty());
        assert_eq!(ring.latest(), None);
        assert_eq!(ring.iter().count(), 0);
    }

    #[test]
    fn test_fill_then_wrap() {
        let mut ring = RingBuffer::<u32>::allocate(3).unwrap();
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), [1, 2]);

        ring.push(3);
        ring.push(4);
        ring.push(5);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.latest(), Some(&5));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), [3, 4, 5]);
    }

    #[test]
    fn test_allocation_is_zero_filled() {
        let ring = RingBuffer::<u64>::allocate(4).unwrap();
        assert_eq!(ring.capacity(), 4);
        assert!(ring.slots.iter().all(|v| *v == 0));
    }

    struct Exhausted;

    // SAFETY: never hands out a block
    unsafe impl RingMemory for Exhausted {
        fn allocate(&self, _layout: Layout) -> Option<NonNull<u8>> {
            None
        }
    }

    #[test]
    fn test_exhausted_memory_does_not_fall_back() {
        let result = RingBuffer::<u64>::allocate_in(16, &Exhausted);
        assert_eq!(
            result.map(|ring| ring.capacity()),
            Err(HistoryError::AllocationFailed { bytes: 128 })
        );
    }

    #[test]
    fn test_impossible_allocation_reports_failure() {
        let result = RingBuffer::<u64>::allocate(usize::MAX / 4);
        assert!(matches!(
            result,
            Err(HistoryError::AllocationFailed { .. })
        ));
    }
}
