mod change_tracker;
mod slot_allocator;

pub use change_tracker::{ChangeCursor, ChangeTracker};
pub use slot_allocator::SlotAllocator;
