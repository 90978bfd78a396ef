//! Runtime: task dispatch and the memory it draws from.

pub mod dispatch;
pub mod memory;
