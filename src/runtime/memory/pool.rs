//! Fixed-capacity slot pool
//!
//! A pool of equally sized slots allocated once at construction. Slots are
//! handed out and reclaimed one at a time; the free list is guarded by a
//! single mutex that is never held while a slot's contents are in use.
//!
//! # Design Principles
//! - Storage is allocated up front, never per slot
//! - O(1) allocate / free under the pool lock
//! - Exhaustion is reported, never papered over

use std::fmt;
use std::mem;
use std::ops::Index;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Index of a slot within a [`SlotPool`].
pub type SlotIndex = u32;

/// Slot pool allocation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The pool was sized for zero slots
    ZeroCapacity,
    /// The requested capacity does not fit a [`SlotIndex`]
    CapacityOverflow(usize),
    /// Every slot is in use
    Exhausted {
        /// Total slots in the pool
        capacity: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AllocError::ZeroCapacity => write!(f, "slot pool has zero capacity"),
            AllocError::CapacityOverflow(n) => {
                write!(f, "slot pool capacity {} exceeds {}", n, SlotIndex::MAX)
            }
            AllocError::Exhausted { capacity } => {
                write!(f, "slot pool exhausted ({} slots in use)", capacity)
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// Fixed-capacity pool of `T` slots.
///
/// The pool only tracks which slots are free. Whatever lives inside a slot
/// must provide its own interior synchronization; the pool hands out shared
/// references through [`SlotPool::get`].
pub struct SlotPool<T> {
    /// Slot storage, allocated once.
    slots: Box<[T]>,
    /// Free slot indices (LIFO).
    free: Mutex<Vec<SlotIndex>>,
    /// Signalled whenever a slot returns to the free list.
    slot_freed: Condvar,
}

impl<T: Default> SlotPool<T> {
    /// Create a pool holding exactly `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Err(AllocError::ZeroCapacity);
        }
        if capacity > SlotIndex::MAX as usize {
            return Err(AllocError::CapacityOverflow(capacity));
        }

        let slots = (0..capacity).map(|_| T::default()).collect::<Vec<_>>();
        // Reversed so that slot 0 is handed out first.
        let free = (0..capacity as SlotIndex).rev().collect::<Vec<_>>();

        Ok(Self {
            slots: slots.into_boxed_slice(),
            free: Mutex::new(free),
            slot_freed: Condvar::new(),
        })
    }

    /// Create a pool sized for a memory budget of `bytes`.
    ///
    /// Capacity is `bytes / size_of::<T>()`, rounded down.
    pub fn from_bytes(bytes: usize) -> Result<Self, AllocError> {
        Self::with_capacity(bytes / Self::slot_size())
    }
}

impl<T> SlotPool<T> {
    /// Size in bytes of a single slot.
    #[inline]
    pub fn slot_size() -> usize {
        mem::size_of::<T>().max(1)
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of free slots.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of slots currently allocated.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Get a slot by index.
    #[inline]
    pub fn get(
        &self,
        index: SlotIndex,
    ) -> Option<&T> {
        self.slots.get(index as usize)
    }

    /// Allocate a slot without blocking.
    pub fn try_allocate(&self) -> Result<SlotIndex, AllocError> {
        self.free.lock().pop().ok_or(AllocError::Exhausted {
            capacity: self.capacity(),
        })
    }

    /// Allocate a slot, blocking until one is freed.
    ///
    /// `None` waits indefinitely; otherwise the call fails with
    /// [`AllocError::Exhausted`] once `timeout` has elapsed.
    pub fn allocate_timeout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<SlotIndex, AllocError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut free = self.free.lock();

        loop {
            if let Some(index) = free.pop() {
                return Ok(index);
            }

            match deadline {
                Some(deadline) => {
                    if self.slot_freed.wait_until(&mut free, deadline).timed_out() {
                        return free.pop().ok_or(AllocError::Exhausted {
                            capacity: self.capacity(),
                        });
                    }
                }
                None => self.slot_freed.wait(&mut free),
            }
        }
    }

    /// Return a slot to the pool.
    ///
    /// Freeing a slot that is already free is a caller bug; it is only
    /// caught in debug builds.
    pub fn free(
        &self,
        index: SlotIndex,
    ) {
        {
            let mut free = self.free.lock();
            debug_assert!((index as usize) < self.slots.len(), "slot {} out of range", index);
            debug_assert!(!free.contains(&index), "slot {} freed twice", index);
            free.push(index);
        }
        self.slot_freed.notify_one();
    }
}

impl<T> Index<SlotIndex> for SlotPool<T> {
    type Output = T;

    #[inline]
    fn index(
        &self,
        index: SlotIndex,
    ) -> &T {
        &self.slots[index as usize]
    }
}

impl<T> fmt::Debug for SlotPool<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("slot_size", &Self::slot_size())
            .finish()
    }
}
