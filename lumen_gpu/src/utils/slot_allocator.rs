use std::collections::BTreeSet;

/// Hands out dense `u32` record indices and takes them back.
///
/// A returned index is reused before the range grows, smallest first, so model
/// records stay packed toward the front of their buffers.
///
/// ```ignore
/// let mut slots = SlotAllocator::new();
/// let first = slots.alloc();   // 0
/// let _second = slots.alloc(); // 1
/// let third = slots.alloc();   // 2
/// slots.free(third);
/// slots.free(first);
/// assert_eq!(slots.alloc(), 0);
/// ```
pub struct SlotAllocator {
    holes: BTreeSet<u32>,
    end: u32,
    live: u32,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self { holes: BTreeSet::new(), end: 0, live: 0 }
    }

    /// Take the smallest free index, growing the range when there are no holes
    pub fn alloc(&mut self) -> u32 {
        self.live += 1;
        match self.holes.pop_first() {
            Some(index) => index,
            None => {
                self.end += 1;
                self.end - 1
            }
        }
    }

    /// Give `index` back. False when it was not handed out.
    pub fn free(&mut self, index: u32) -> bool {
        if !self.is_allocated(index) {
            return false;
        }
        self.holes.insert(index);
        self.live -= 1;
        true
    }

    pub fn is_allocated(&self, index: u32) -> bool {
        index < self.end && !self.holes.contains(&index)
    }

    pub fn len(&self) -> u32 {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
