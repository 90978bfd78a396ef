//! Memory management for the dispatcher
//!
//! Task storage lives in a [`SlotPool`]: a fixed block of slots allocated
//! once when the dispatcher is built. Submitting a task reuses a free slot
//! instead of allocating, so steady-state dispatch never touches the heap.

mod pool;

pub use pool::{AllocError, SlotIndex, SlotPool};
