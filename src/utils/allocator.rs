use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Slot index paired with the generation it was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Handle to a body inside one world. Handles are only meaningful for the
/// world that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub GenerationalId);

impl EntityId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self(GenerationalId::new(index, generation))
    }

    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn generation(&self) -> u32 {
        self.0.generation
    }

    pub fn is_null(&self) -> bool {
        self.0.index == usize::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self(GenerationalId::new(usize::MAX, 0))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "entity(null)")
        } else {
            write!(f, "entity({}v{})", self.index(), self.generation())
        }
    }
}

/// Issues generational slot indices and recycles freed ones.
#[derive(Debug, Default, Clone)]
pub struct SlotAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_list: VecDeque<usize>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new id and whether it reuses an existing slot.
    pub fn allocate(&mut self) -> (EntityId, bool) {
        if let Some(index) = self.free_list.pop_front() {
            self.alive[index] = true;
            return (EntityId::new(index, self.generations[index]), true);
        }

        let index = self.generations.len();
        self.generations.push(0);
        self.alive.push(true);
        (EntityId::new(index, 0), false)
    }

    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_valid(id) {
            return false;
        }
        let index = id.index();
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.alive[index] = false;
        self.free_list.push_back(index);
        true
    }

    pub fn is_valid(&self, id: EntityId) -> bool {
        self.alive.get(id.index()).copied().unwrap_or(false)
            && self.generations[id.index()] == id.generation()
    }

    /// Liveness flag per slot, indexed like the storage columns.
    pub fn alive_slots(&self) -> &[bool] {
        &self.alive
    }

    /// Number of slots ever issued, alive or not.
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    pub fn live_count(&self) -> usize {
        self.generations.len() - self.free_list.len()
    }

    pub fn clear(&mut self) {
        self.generations.clear();
        self.alive.clear();
        self.free_list.clear();
    }
}
