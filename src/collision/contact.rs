//! Contact records and the bounded buffer narrowphase appends them to.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;

use crate::config::MAX_CONTACT_POINTS;
use crate::error::{PhysicsError, Result};
use crate::utils::allocator::EntityId;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactPoint {
    /// World-space point midway between the two touching surfaces.
    pub position: Vec3,
    /// Half the penetration distance along the contact normal.
    pub depth: f32,
}

impl ContactPoint {
    pub fn new(position: Vec3, depth: f32) -> Self {
        Self { position, depth }
    }
}

/// One contact manifold between a reference and an alternate body.
///
/// `normal` points from the reference body into the alternate body, so the
/// surface point on the reference side is `position + normal * depth` and
/// the one on the alternate side is `position - normal * depth`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub reference: EntityId,
    pub alternate: EntityId,
    pub points: [ContactPoint; MAX_CONTACT_POINTS],
    pub num_points: usize,
    pub normal: Vec3,
    /// Accumulated normal multiplier from the positional solve.
    pub lambda_n: f32,
    /// Accumulated tangential (static friction) multiplier.
    pub lambda_t: f32,
}

impl Default for Contact {
    fn default() -> Self {
        Self::new(EntityId::default(), EntityId::default(), Vec3::Z)
    }
}

impl Contact {
    pub fn new(reference: EntityId, alternate: EntityId, normal: Vec3) -> Self {
        Self {
            reference,
            alternate,
            points: [ContactPoint::default(); MAX_CONTACT_POINTS],
            num_points: 0,
            normal,
            lambda_n: 0.0,
            lambda_t: 0.0,
        }
    }

    /// Appends a point; returns false once the manifold is full.
    pub fn push_point(&mut self, point: ContactPoint) -> bool {
        if self.num_points >= MAX_CONTACT_POINTS {
            return false;
        }
        self.points[self.num_points] = point;
        self.num_points += 1;
        true
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.num_points.min(MAX_CONTACT_POINTS)]
    }

    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// The two bodies, lower id first.
    pub fn pair(&self) -> (EntityId, EntityId) {
        if self.reference <= self.alternate {
            (self.reference, self.alternate)
        } else {
            (self.alternate, self.reference)
        }
    }
}

/// Fixed-capacity, append-only contact storage shared by concurrent
/// narrowphase tasks of one world.
///
/// Appenders reserve slot ranges through a relaxed atomic counter; every
/// index is handed out once, so each slot has a single writer. Reading goes
/// through `&mut self`, which the step pipeline only obtains after all
/// appenders have finished.
pub struct ContactBuffer {
    slots: Box<[UnsafeCell<Contact>]>,
    len: AtomicUsize,
    dropped: AtomicUsize,
}

// SAFETY: concurrent access through `&self` is limited to `reserve`/`push`,
// which write only to freshly reserved, disjoint slots. Reads require
// `&mut self`.
unsafe impl Sync for ContactBuffer {}

impl ContactBuffer {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(Contact::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            len: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserves `count` consecutive slots and returns the first index.
    /// Fails without reserving anything when the slots do not fit.
    pub fn reserve(&self, count: usize) -> Result<usize> {
        let capacity = self.capacity();
        self.len
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |len| {
                len.checked_add(count).filter(|&end| end <= capacity)
            })
            .map_err(|_| PhysicsError::CapacityExceeded {
                requested: count,
                capacity,
            })
    }

    /// Reserves one slot and writes `contact` into it.
    pub fn push(&self, contact: Contact) -> Result<usize> {
        let index = self.reserve(1)?;
        // SAFETY: `index` was just reserved and no other writer holds it;
        // readers need `&mut self` and cannot coexist with this borrow.
        unsafe {
            *self.slots[index].get() = contact;
        }
        Ok(index)
    }

    /// Counts a manifold that was discarded because the buffer was full.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn contacts(&mut self) -> &[Contact] {
        self.contacts_mut()
    }

    pub fn contacts_mut(&mut self) -> &mut [Contact] {
        let len = (*self.len.get_mut()).min(self.slots.len());
        let slots = &mut self.slots[..len];
        // SAFETY: `UnsafeCell<T>` has the same layout as `T`, and `&mut self`
        // guarantees no concurrent writer.
        unsafe { &mut *(slots as *mut [UnsafeCell<Contact>] as *mut [Contact]) }
    }

    /// Forgets the stored contacts; the storage is overwritten next substep.
    pub fn clear(&mut self) {
        *self.len.get_mut() = 0;
    }

    pub fn reset_dropped(&mut self) {
        *self.dropped.get_mut() = 0;
    }
}

impl std::fmt::Debug for ContactBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}
