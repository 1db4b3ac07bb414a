use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::utils::allocator::EntityId;

/// Unordered body pair whose bounds overlapped this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateCollision {
    pub a: EntityId,
    pub b: EntityId,
}

impl CandidateCollision {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }
}

/// Body pair that produced at least one contact during the last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub a: EntityId,
    pub b: EntityId,
}

impl CollisionEvent {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }

    pub fn involves(&self, entity: EntityId) -> bool {
        self.a == entity || self.b == entity
    }
}

/// Event sink written by concurrent narrowphase tasks.
#[derive(Debug, Default)]
pub struct EventCollector {
    pending: Mutex<Vec<CollisionEvent>>,
}

impl EventCollector {
    pub fn record(&self, a: EntityId, b: EntityId) {
        self.pending.lock().push(CollisionEvent::new(a, b));
    }

    /// Moves the recorded events out, sorted and with repeats removed.
    /// A pair touching in several substeps is reported once.
    pub fn drain_unique(&mut self) -> Vec<CollisionEvent> {
        let mut events = std::mem::take(self.pending.get_mut());
        events.sort_unstable();
        events.dedup();
        events
    }

    pub fn clear(&mut self) {
        self.pending.get_mut().clear();
    }
}
