//! Dispatcher statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Live counters, updated lock-free by producers and workers.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Tasks accepted by submit.
    pub tasks_submitted: AtomicUsize,
    /// Tasks whose kernel returned (or unwound) and whose slot was freed.
    pub tasks_completed: AtomicUsize,
    /// Submissions rejected for lack of a free slot.
    pub tasks_rejected: AtomicUsize,
    /// Longest queue observed right after a push.
    pub peak_queue_len: AtomicUsize,
    /// Total kernel execution time in microseconds.
    pub total_exec_time_us: AtomicU64,
}

impl DispatcherStats {
    /// Record an accepted task and the queue length it produced.
    #[inline]
    pub fn record_submitted(
        &self,
        queue_len: usize,
    ) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        self.peak_queue_len.fetch_max(queue_len, Ordering::Relaxed);
    }

    /// Record a finished task.
    #[inline]
    pub fn record_completed(
        &self,
        duration_us: u64,
    ) {
        self.tasks_completed.fetch_add(1, Ordering::Release);
        self.total_exec_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    /// Record a rejected submission.
    #[inline]
    pub fn record_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks submitted but not yet completed.
    pub fn outstanding(&self) -> usize {
        let completed = self.tasks_completed.load(Ordering::Acquire);
        self.tasks_submitted
            .load(Ordering::Relaxed)
            .saturating_sub(completed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Acquire),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            peak_queue_len: self.peak_queue_len.load(Ordering::Relaxed),
            total_exec_time_us: self.total_exec_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`DispatcherStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub tasks_submitted: usize,
    pub tasks_completed: usize,
    pub tasks_rejected: usize,
    pub peak_queue_len: usize,
    pub total_exec_time_us: u64,
}

impl StatsSnapshot {
    /// Mean kernel time in microseconds, 0 when nothing completed.
    pub fn mean_exec_time_us(&self) -> f64 {
        if self.tasks_completed == 0 {
            return 0.0;
        }
        self.total_exec_time_us as f64 / self.tasks_completed as f64
    }
}
