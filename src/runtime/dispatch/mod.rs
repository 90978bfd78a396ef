//! Multicore task dispatcher
//!
//! [`TaskDispatcher`] runs kernels on a fixed pool of worker threads fed by
//! a single FIFO queue. Task storage comes from a fixed [`SlotPool`] sized at
//! construction; each submission reuses a free slot and stamps it with a
//! fresh generation from a dispatcher-wide counter.
//!
//! # Handles
//!
//! [`submit`](TaskDispatcher::submit) returns a [`TaskId`] of
//! `(slot offset, generation)`. The slot is stamped again when the task
//! finishes, so a handle is live exactly while the slot generation still
//! equals the one it captured. Once it differs, the handle only tells you the
//! task is no longer outstanding; the slot may already hold unrelated work.
//!
//! # Locks
//!
//! The pool free list and the queue have separate locks. Neither is held
//! while a kernel runs, and they are never held together.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start()--> Running --pause()/synchronize()--> Stopped
//! ```
//!
//! [`synchronize`](TaskDispatcher::synchronize) queues one pill per worker
//! behind all submitted work and joins the workers. A worker exits when it
//! pops a pill while the dispatcher is stopped.

pub mod error;
pub mod queue;
pub mod stats;
pub mod task;

pub use error::{DispatchError, DispatchResult};
pub use queue::{QueueEntry, TaskQueue};
pub use stats::{DispatcherStats, StatsSnapshot};
pub use task::{
    noop_kernel, Generation, Payload, StreamData, Task, TaskData, TaskId, TaskKernel, TaskStatus,
    STREAM_WIDTH,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::runtime::memory::{AllocError, SlotIndex, SlotPool};
use task::TaskSlot;

/// Default number of task slots.
pub const DEFAULT_POOL_SLOTS: usize = 1024;

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME: &str = "task-worker";

/// Upper bound on `num_workers`.
pub const MAX_WORKERS: usize = u16::MAX as usize;

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Number of task slots in the pool.
    pub pool_slots: usize,
    /// Pool memory budget in bytes; overrides `pool_slots` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_bytes: Option<usize>,
    /// How long `submit` may block on a full pool; unset waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_timeout_ms: Option<u64>,
    /// Worker thread name prefix.
    pub thread_name: String,
    /// Worker stack size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let num_cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            num_workers: num_cpus,
            pool_slots: DEFAULT_POOL_SLOTS,
            pool_bytes: None,
            submit_timeout_ms: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_size: None,
        }
    }
}

impl DispatcherConfig {
    /// Config with the given worker count and pool size.
    pub fn new(
        num_workers: usize,
        pool_slots: usize,
    ) -> Self {
        Self {
            num_workers,
            pool_slots,
            ..Self::default()
        }
    }

    /// Size the pool by memory budget instead of slot count.
    #[inline]
    pub fn with_pool_bytes(
        mut self,
        bytes: usize,
    ) -> Self {
        self.pool_bytes = Some(bytes);
        self
    }

    /// Bound how long `submit` blocks on a full pool.
    #[inline]
    pub fn with_submit_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.submit_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the worker thread name prefix.
    #[inline]
    pub fn with_thread_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the worker stack size.
    #[inline]
    pub fn with_stack_size(
        mut self,
        size: usize,
    ) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Submit timeout as a duration.
    #[inline]
    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_ms.map(Duration::from_millis)
    }

    /// Reject configurations the dispatcher cannot run with.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.num_workers == 0 {
            return Err(DispatchError::InvalidConfig(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.num_workers > MAX_WORKERS {
            return Err(DispatchError::InvalidConfig(format!(
                "num_workers must be at most {}, got {}",
                MAX_WORKERS, self.num_workers
            )));
        }
        if self.pool_bytes.is_none() && self.pool_slots == 0 {
            return Err(DispatchError::InvalidConfig(
                "pool_slots must be at least 1".to_string(),
            ));
        }
        if self.thread_name.is_empty() {
            return Err(DispatchError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Run state of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Workers are not running, or will exit at the next pill.
    #[default]
    Stopped,
    /// Workers are processing the queue.
    Running,
}

impl RunState {
    #[inline]
    fn from_u8(val: u8) -> Self {
        match val {
            1 => RunState::Running,
            _ => RunState::Stopped,
        }
    }

    #[inline]
    fn as_u8(self) -> u8 {
        match self {
            RunState::Stopped => 0,
            RunState::Running => 1,
        }
    }
}

/// State shared between the dispatcher handle and its workers.
struct Shared {
    pool: SlotPool<TaskSlot>,
    queue: TaskQueue,
    generation_counter: CachePadded<AtomicU64>,
    state: AtomicU8,
    live_workers: AtomicUsize,
    /// Waiters on task completion park here.
    completion_lock: Mutex<()>,
    completion: Condvar,
    stats: DispatcherStats,
}

impl Shared {
    /// Bump the global generation counter.
    #[inline]
    fn next_generation(&self) -> Generation {
        self.generation_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    fn run_state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn swap_run_state(
        &self,
        state: RunState,
    ) -> RunState {
        RunState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel))
    }

    fn signal_completion(&self) {
        let _guard = self.completion_lock.lock();
        self.completion.notify_all();
    }

    fn worker_loop(
        &self,
        worker_id: usize,
    ) {
        let _live = LiveWorker(&self.live_workers);
        debug!(worker = worker_id, "worker started");

        loop {
            match self.queue.pop_blocking() {
                QueueEntry::Task(index) => self.run_task(index),
                QueueEntry::Pill => {
                    if self.run_state() == RunState::Stopped {
                        break;
                    }
                }
            }
        }

        debug!(worker = worker_id, "worker exiting");
    }

    fn run_task(
        &self,
        index: SlotIndex,
    ) {
        let slot = &self.pool[index];
        let (kernel, data) = slot.begin();
        trace!(slot = index, generation = slot.generation(), "executing task");

        let retire = Retire {
            shared: self,
            index,
            start: Instant::now(),
        };
        kernel(&data);
        drop(data);
        drop(retire);
    }
}

/// Keeps `live_workers` accurate even if a worker unwinds.
struct LiveWorker<'a>(&'a AtomicUsize);

impl Drop for LiveWorker<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Frees a task's slot once its kernel returns or unwinds.
struct Retire<'a> {
    shared: &'a Shared,
    index: SlotIndex,
    start: Instant,
}

impl Drop for Retire<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!(slot = self.index, "kernel panicked, releasing its slot");
        }

        let shared = self.shared;
        shared
            .stats
            .record_completed(self.start.elapsed().as_micros() as u64);
        shared.pool[self.index].retire(shared.next_generation());
        shared.pool.free(self.index);
        shared.signal_completion();
    }
}

/// Fixed-pool, single-queue task dispatcher.
pub struct TaskDispatcher {
    config: DispatcherConfig,
    shared: Arc<Shared>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl TaskDispatcher {
    /// Build a stopped dispatcher. Workers are spawned by [`start`](Self::start).
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        config.validate()?;

        let pool = match config.pool_bytes {
            Some(bytes) => SlotPool::<TaskSlot>::from_bytes(bytes)?,
            None => SlotPool::<TaskSlot>::with_capacity(config.pool_slots)?,
        };
        let capacity = pool.capacity();

        let shared = Arc::new(Shared {
            pool,
            // Every slot plus one pill per worker fits without growing.
            queue: TaskQueue::with_capacity(capacity.saturating_add(config.num_workers)),
            generation_counter: CachePadded::new(AtomicU64::new(0)),
            state: AtomicU8::new(RunState::Stopped.as_u8()),
            live_workers: AtomicUsize::new(0),
            completion_lock: Mutex::new(()),
            completion: Condvar::new(),
            stats: DispatcherStats::default(),
        });

        debug!(
            workers = config.num_workers,
            capacity,
            slot_bytes = SlotPool::<TaskSlot>::slot_size(),
            "task dispatcher created"
        );

        Ok(Self {
            workers: Mutex::new(Vec::with_capacity(config.num_workers)),
            config,
            shared,
        })
    }

    /// Build a dispatcher with `num_workers` threads and `pool_slots` slots.
    #[inline]
    pub fn with_workers(
        num_workers: usize,
        pool_slots: usize,
    ) -> DispatchResult<Self> {
        Self::new(DispatcherConfig::new(num_workers, pool_slots))
    }

    /// Start processing.
    ///
    /// No-op while live workers exist; after a pause they simply resume.
    /// If every worker has died (each from a kernel panic), the dead threads
    /// are reaped and a fresh set of `num_workers` threads is spawned.
    pub fn start(&self) -> DispatchResult<()> {
        let mut workers = self.workers.lock();
        let previous = self.shared.swap_run_state(RunState::Running);

        if !workers.is_empty() {
            if self.live_workers() > 0 {
                if previous == RunState::Stopped {
                    debug!(workers = workers.len(), "task dispatcher resumed");
                }
                return Ok(());
            }
            for (worker_id, handle) in workers.drain(..).enumerate() {
                if handle.join().is_err() {
                    warn!(worker = worker_id, "reaped worker that panicked");
                }
            }
            self.shared.queue.purge_pills();
        } else if previous == RunState::Running {
            return Ok(());
        }

        for worker_id in 0..self.config.num_workers {
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", self.config.thread_name, worker_id));
            if let Some(size) = self.config.stack_size {
                builder = builder.stack_size(size);
            }

            self.shared.live_workers.fetch_add(1, Ordering::AcqRel);
            let shared = self.shared.clone();
            match builder.spawn(move || shared.worker_loop(worker_id)) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    self.shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                    warn!(worker = worker_id, error = %err, "failed to spawn worker");
                    self.stop_workers(&mut workers);
                    return Err(err.into());
                }
            }
        }

        info!(
            workers = workers.len(),
            capacity = self.capacity(),
            "task dispatcher started"
        );
        Ok(())
    }

    /// Mark the dispatcher stopped.
    ///
    /// This does not suspend execution: live workers keep running queued and
    /// newly submitted tasks. They only exit at the pills queued by
    /// [`synchronize`](Self::synchronize).
    pub fn pause(&self) {
        if self.shared.swap_run_state(RunState::Stopped) == RunState::Running {
            debug!("task dispatcher paused");
        }
    }

    /// Drain all queued work, then join every worker.
    ///
    /// Must not race with `submit` calls from other threads. Returns
    /// [`DispatchError::WorkerPanicked`] if any worker died from a kernel
    /// panic; the remaining workers are still joined.
    pub fn synchronize(&self) -> DispatchResult<()> {
        let mut workers = self.workers.lock();
        if workers.is_empty() {
            self.shared.swap_run_state(RunState::Stopped);
            return Ok(());
        }

        let panicked = self.stop_workers(&mut workers);

        info!(
            completed = self.shared.stats.tasks_completed.load(Ordering::Acquire),
            queued = self.queued_len(),
            "task dispatcher synchronized"
        );

        match panicked {
            Some(worker) => Err(DispatchError::WorkerPanicked { worker }),
            None => Ok(()),
        }
    }

    /// Stop, pill and join `workers`. Returns the first worker that panicked.
    fn stop_workers(
        &self,
        workers: &mut Vec<thread::JoinHandle<()>>,
    ) -> Option<usize> {
        self.shared.swap_run_state(RunState::Stopped);
        self.shared.queue.push_pills(workers.len());

        let mut panicked = None;
        for (worker_id, handle) in workers.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker = worker_id, "worker thread panicked");
                panicked.get_or_insert(worker_id);
            } else {
                debug!(worker = worker_id, "worker joined");
            }
        }

        let stale = self.shared.queue.purge_pills();
        if stale > 0 {
            debug!(stale, "dropped unconsumed pills");
        }
        panicked
    }

    /// Submit a task.
    ///
    /// When the pool is full this blocks until a worker frees a slot, for at
    /// most the configured submit timeout. With no live workers nothing can
    /// free a slot, so it fails right away with
    /// [`DispatchError::PoolExhausted`].
    pub fn submit(
        &self,
        data: TaskData,
        kernel: TaskKernel,
    ) -> DispatchResult<TaskId> {
        let index = match self.shared.pool.try_allocate() {
            Ok(index) => index,
            Err(AllocError::Exhausted { .. }) if self.live_workers() > 0 => {
                trace!("task pool full, waiting for a free slot");
                self.shared
                    .pool
                    .allocate_timeout(self.config.submit_timeout())
                    .map_err(|err| self.reject(err))?
            }
            Err(err) => return Err(self.reject(err)),
        };

        Ok(self.enqueue(index, data, kernel))
    }

    /// Submit a task without blocking on a full pool.
    pub fn try_submit(
        &self,
        data: TaskData,
        kernel: TaskKernel,
    ) -> DispatchResult<TaskId> {
        let index = self
            .shared
            .pool
            .try_allocate()
            .map_err(|err| self.reject(err))?;

        Ok(self.enqueue(index, data, kernel))
    }

    fn reject(
        &self,
        err: AllocError,
    ) -> DispatchError {
        self.shared.stats.record_rejected();
        warn!(capacity = self.capacity(), "task submission rejected: {}", err);
        err.into()
    }

    fn enqueue(
        &self,
        index: SlotIndex,
        data: TaskData,
        kernel: TaskKernel,
    ) -> TaskId {
        let generation = self.shared.next_generation();
        self.shared.pool[index].stamp(kernel, data, generation);

        let id = TaskId::new(index, generation);
        let queued = self.shared.queue.push(QueueEntry::Task(index));
        self.shared.stats.record_submitted(queued);
        trace!(task = %id, queued, "task submitted");

        id
    }

    /// Block until `id` is no longer outstanding.
    ///
    /// Blocks forever if the task is queued and no worker will ever run it
    /// (dispatcher never started), or if called from a kernel on a
    /// single-worker dispatcher while waiting on a later task.
    pub fn wait_for_task(
        &self,
        id: TaskId,
    ) -> DispatchResult<()> {
        let slot = self.slot_for(id)?;
        if slot.status_of(id) == TaskStatus::Retired {
            return Ok(());
        }

        let mut guard = self.shared.completion_lock.lock();
        while slot.status_of(id) != TaskStatus::Retired {
            self.shared.completion.wait(&mut guard);
        }
        Ok(())
    }

    /// Like [`wait_for_task`](Self::wait_for_task), giving up after `timeout`.
    pub fn wait_for_task_timeout(
        &self,
        id: TaskId,
        timeout: Duration,
    ) -> DispatchResult<()> {
        let slot = self.slot_for(id)?;
        if slot.status_of(id) == TaskStatus::Retired {
            return Ok(());
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.shared.completion_lock.lock();
        while slot.status_of(id) != TaskStatus::Retired {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .completion
                        .wait_until(&mut guard, deadline)
                        .timed_out()
                    {
                        if slot.status_of(id) == TaskStatus::Retired {
                            return Ok(());
                        }
                        return Err(DispatchError::WaitTimeout(id));
                    }
                }
                None => self.shared.completion.wait(&mut guard),
            }
        }
        Ok(())
    }

    /// True once `id` no longer refers to outstanding work.
    ///
    /// This does not distinguish "finished" from "finished and the slot was
    /// reused". Handles outside the pool also report true.
    #[inline]
    pub fn is_task_finished(
        &self,
        id: TaskId,
    ) -> bool {
        self.task_status(id) == TaskStatus::Retired
    }

    /// Current status of `id`.
    pub fn task_status(
        &self,
        id: TaskId,
    ) -> TaskStatus {
        match self.shared.pool.get(id.offset()) {
            Some(slot) => slot.status_of(id),
            None => TaskStatus::Retired,
        }
    }

    fn slot_for(
        &self,
        id: TaskId,
    ) -> DispatchResult<&TaskSlot> {
        self.shared
            .pool
            .get(id.offset())
            .ok_or(DispatchError::InvalidHandle(id))
    }

    /// Current run state.
    #[inline]
    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    /// Check if the dispatcher is running.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    /// The configuration this dispatcher was built with.
    #[inline]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Configured worker count.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Worker threads currently alive.
    #[inline]
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }

    /// Total task slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.pool.capacity()
    }

    /// Free task slots.
    #[inline]
    pub fn available_slots(&self) -> usize {
        self.shared.pool.available()
    }

    /// Tasks waiting in the queue.
    #[inline]
    pub fn queued_len(&self) -> usize {
        self.shared.queue.task_count()
    }

    /// Statistics.
    #[inline]
    pub fn stats(&self) -> &DispatcherStats {
        &self.shared.stats
    }
}

impl fmt::Debug for TaskDispatcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("state", &self.run_state())
            .field("workers", &self.num_workers())
            .field("live_workers", &self.live_workers())
            .field("pool", &self.shared.pool)
            .field("queued", &self.queued_len())
            .finish()
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.pause();
        if let Err(err) = self.synchronize() {
            warn!(error = %err, "task dispatcher shut down with errors");
        }
    }
}

#[cfg(test)]
mod tests;
