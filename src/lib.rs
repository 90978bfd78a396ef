//! taskdispatch
//!
//! A multicore task dispatcher: a fixed pool of worker threads consuming a
//! single FIFO of `(kernel, data)` tasks whose storage comes from a slot pool
//! allocated once up front.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use taskdispatch::{TaskData, TaskDispatcher};
//!
//! fn bump(data: &TaskData) {
//!     if let Some(counter) = data.get::<AtomicUsize>() {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let dispatcher = TaskDispatcher::with_workers(2, 16).unwrap();
//! dispatcher.start().unwrap();
//! for _ in 0..10 {
//!     dispatcher.submit(TaskData::shared(counter.clone()), bump).unwrap();
//! }
//! dispatcher.synchronize().unwrap();
//! assert_eq!(counter.load(Ordering::Relaxed), 10);
//! ```
//!
//! # Crate Features
//!
//! - `debug`: Enable debug logging by default in the binary

#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::dispatch::{
    DispatchError, DispatchResult, DispatcherConfig, DispatcherStats, RunState, StatsSnapshot,
    StreamData, TaskData, TaskDispatcher, TaskId, TaskKernel, TaskStatus,
};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "taskdispatch";

/// Outcome of [`run_counter`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Tasks submitted
    pub tasks: usize,
    /// Final counter value; equals `tasks` when nothing was lost
    pub counter: u64,
    /// Wall time from start to synchronize, in milliseconds
    pub elapsed_ms: f64,
    /// Worker threads
    pub workers: usize,
    /// Pool slots
    pub capacity: usize,
    /// Dispatcher counters after synchronize
    pub stats: StatsSnapshot,
}

impl RunReport {
    /// Whether every submitted task ran exactly once.
    pub fn is_consistent(&self) -> bool {
        self.counter == self.tasks as u64 && self.stats.tasks_completed == self.tasks
    }
}

fn count_kernel(data: &TaskData) {
    if let Some(counter) = data.get::<AtomicU64>() {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Run `tasks` counter increments through a fresh dispatcher.
///
/// # Example
///
/// ```no_run
/// use taskdispatch::{run_counter, DispatcherConfig, Result};
///
/// fn main() -> Result<()> {
///     let report = run_counter(DispatcherConfig::new(4, 8), 100)?;
///     assert_eq!(report.counter, 100);
///     Ok(())
/// }
/// ```
pub fn run_counter(
    config: DispatcherConfig,
    tasks: usize,
) -> Result<RunReport> {
    let dispatcher = TaskDispatcher::new(config).context("Failed to create dispatcher")?;
    let counter = Arc::new(AtomicU64::new(0));

    debug!(tasks, "running counter workload");
    let started = Instant::now();
    dispatcher.start().context("Failed to start workers")?;
    for n in 0..tasks {
        dispatcher
            .submit(TaskData::shared(counter.clone()), count_kernel)
            .with_context(|| format!("Failed to submit task {}", n))?;
    }
    dispatcher
        .synchronize()
        .context("Failed to synchronize workers")?;
    let elapsed = started.elapsed();

    let report = RunReport {
        tasks,
        counter: counter.load(Ordering::Relaxed),
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        workers: dispatcher.num_workers(),
        capacity: dispatcher.capacity(),
        stats: dispatcher.stats().snapshot(),
    };
    info!(
        tasks,
        counter = report.counter,
        elapsed_ms = report.elapsed_ms,
        "counter workload finished"
    );
    Ok(report)
}
