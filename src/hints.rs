//! Bounded priority set of offsets worth probing soon.
//!
//! Two independent queues exist during a scan: one for generic
//! next-partition hints and one for RAID-member hints, so that the
//! RAID arithmetic (which can fan out into dozens of hypotheses per
//! found partition) never starves ordinary scanning.
//!
//! The queue is capacity-bounded: once full, new hints are silently
//! dropped. Pathological media must not cause unbounded memory growth;
//! losing low-priority hints is an accepted degradation, not an error.

/// Maximum number of pending hints per queue.
pub const HINT_CAPACITY: usize = 1024;

/// Ascending, duplicate-free, capacity-bounded set of byte offsets.
#[derive(Debug, Clone, Default)]
pub struct HintQueue {
    offsets: Vec<u64>,
}

impl HintQueue {
    pub fn new() -> Self {
        Self {
            offsets: Vec::new(),
        }
    }

    /// Insert an offset, keeping ascending order. No-op if the offset is
    /// already queued or the queue is at capacity.
    pub fn insert(&mut self, offset: u64) {
        match self.offsets.binary_search(&offset) {
            Ok(_) => {}
            Err(pos) => {
                if self.offsets.len() >= HINT_CAPACITY {
                    tracing::debug!(offset, "hint queue full, dropping hint");
                    return;
                }
                self.offsets.insert(pos, offset);
            }
        }
    }

    /// Remove and return the smallest queued offset if it is at or
    /// before `cursor`.
    pub fn pop_if_due(&mut self, cursor: u64) -> Option<u64> {
        if self.offsets.first().is_some_and(|&o| o <= cursor) {
            Some(self.offsets.remove(0))
        } else {
            None
        }
    }

    /// Smallest queued offset, without removing it.
    pub fn peek(&self) -> Option<u64> {
        self.offsets.first().copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.offsets.binary_search(&offset).is_ok()
    }
}
