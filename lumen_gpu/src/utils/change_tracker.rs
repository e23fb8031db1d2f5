/// Edge-triggered change notification shared by several pollers
///
/// The owner calls [`mark`](ChangeTracker::mark) on every structural change.
/// Each poller keeps its own [`ChangeCursor`] and sees each change once.
#[derive(Debug, Default, Clone)]
pub struct ChangeTracker {
    generation: u64,
}

/// Per-poller position in a [`ChangeTracker`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChangeCursor {
    seen: u64,
}

impl ChangeCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change
    pub fn mark(&mut self) {
        self.generation += 1;
    }

    /// True if something changed since `cursor` last polled; advances the cursor
    pub fn poll(&self, cursor: &mut ChangeCursor) -> bool {
        if cursor.seen == self.generation {
            return false;
        }
        cursor.seen = self.generation;
        true
    }
}
