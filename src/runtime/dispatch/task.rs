//! Task definitions for the dispatcher.
//!
//! A [`Task`] is a kernel function pointer plus the [`TaskData`] it runs on.
//! Tasks live inside pool slots for the lifetime of the dispatcher; submitting
//! work only rewrites a slot's contents and stamps it with a new generation.

use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;

use crate::runtime::memory::SlotIndex;

/// Generation stamp of a slot.
///
/// `0` is never issued, so a default [`TaskId`] never matches a live task.
pub type Generation = u64;

/// Shared, type-erased payload handed to kernels.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Kernel signature.
pub type TaskKernel = fn(&TaskData);

/// Number of inputs and outputs in a [`StreamData`] descriptor.
pub const STREAM_WIDTH: usize = 4;

/// Kernel that does nothing. Empty slots hold it.
pub fn noop_kernel(_data: &TaskData) {}

/// Handle to a submitted task.
///
/// A handle stays valid while the slot's generation still equals the one it
/// captured at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TaskId {
    offset: SlotIndex,
    generation: Generation,
}

impl TaskId {
    /// Create a handle from a slot offset and generation.
    #[inline]
    pub fn new(
        offset: SlotIndex,
        generation: Generation,
    ) -> Self {
        Self { offset, generation }
    }

    /// Slot offset within the pool.
    #[inline]
    pub fn offset(&self) -> SlotIndex {
        self.offset
    }

    /// Generation captured at submission.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Task({}#{})", self.offset, self.generation)
    }
}

/// Fan-in / fan-out descriptor: up to four inputs and four outputs.
#[derive(Clone, Default)]
pub struct StreamData {
    /// Input payloads.
    pub inputs: [Option<Payload>; STREAM_WIDTH],
    /// Output payloads.
    pub outputs: [Option<Payload>; STREAM_WIDTH],
}

impl StreamData {
    /// Create an empty stream descriptor.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set input `index`.
    ///
    /// # Panics
    /// Panics if `index >= STREAM_WIDTH`.
    pub fn with_input<T: Any + Send + Sync>(
        mut self,
        index: usize,
        value: Arc<T>,
    ) -> Self {
        self.inputs[index] = Some(value as Payload);
        self
    }

    /// Set output `index`.
    ///
    /// # Panics
    /// Panics if `index >= STREAM_WIDTH`.
    pub fn with_output<T: Any + Send + Sync>(
        mut self,
        index: usize,
        value: Arc<T>,
    ) -> Self {
        self.outputs[index] = Some(value as Payload);
        self
    }

    /// Input `index`, downcast to `T`.
    pub fn input<T: Any>(
        &self,
        index: usize,
    ) -> Option<&T> {
        self.inputs.get(index)?.as_deref()?.downcast_ref()
    }

    /// Output `index`, downcast to `T`.
    pub fn output<T: Any>(
        &self,
        index: usize,
    ) -> Option<&T> {
        self.outputs.get(index)?.as_deref()?.downcast_ref()
    }

    /// Number of populated inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.iter().filter(|p| p.is_some()).count()
    }

    /// Number of populated outputs.
    pub fn output_count(&self) -> usize {
        self.outputs.iter().filter(|p| p.is_some()).count()
    }
}

impl fmt::Debug for StreamData {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StreamData")
            .field("inputs", &self.input_count())
            .field("outputs", &self.output_count())
            .finish()
    }
}

/// Data a kernel runs on.
#[derive(Clone, Default)]
pub enum TaskData {
    /// No payload.
    #[default]
    Empty,
    /// A single shared context.
    Context(Payload),
    /// Fan-in / fan-out descriptor.
    Stream(StreamData),
}

impl TaskData {
    /// Wrap `value` as a context payload.
    #[inline]
    pub fn context<T: Any + Send + Sync>(value: T) -> Self {
        TaskData::Context(Arc::new(value))
    }

    /// Use an already shared value as the context payload.
    #[inline]
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        TaskData::Context(value)
    }

    /// The context payload, downcast to `T`.
    ///
    /// Returns `None` for other variants or a type mismatch.
    pub fn get<T: Any>(&self) -> Option<&T> {
        match self {
            TaskData::Context(payload) => payload.downcast_ref(),
            _ => None,
        }
    }

    /// The stream descriptor, if this is a stream payload.
    pub fn stream(&self) -> Option<&StreamData> {
        match self {
            TaskData::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Check for the empty payload.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, TaskData::Empty)
    }
}

impl From<StreamData> for TaskData {
    fn from(stream: StreamData) -> Self {
        TaskData::Stream(stream)
    }
}

impl fmt::Debug for TaskData {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            TaskData::Empty => write!(f, "Empty"),
            TaskData::Context(_) => write!(f, "Context(..)"),
            TaskData::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

/// A unit of work: kernel, data and the generation it was stamped with.
pub struct Task {
    kernel: TaskKernel,
    data: TaskData,
    generation: Generation,
}

impl Task {
    /// Create a task.
    #[inline]
    pub fn new(
        kernel: TaskKernel,
        data: TaskData,
        generation: Generation,
    ) -> Self {
        Self {
            kernel,
            data,
            generation,
        }
    }

    /// The kernel.
    #[inline]
    pub fn kernel(&self) -> TaskKernel {
        self.kernel
    }

    /// The data.
    #[inline]
    pub fn data(&self) -> &TaskData {
        &self.data
    }

    /// Generation stamped at allocation.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Run the kernel on this task's data.
    #[inline]
    pub fn execute(&self) {
        (self.kernel)(&self.data)
    }

    /// Move kernel and data out, leaving the no-op kernel and empty data.
    fn take(&mut self) -> (TaskKernel, TaskData) {
        let kernel = mem::replace(&mut self.kernel, noop_kernel);
        (kernel, mem::take(&mut self.data))
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new(noop_kernel, TaskData::Empty, 0)
    }
}

impl fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Task")
            .field("kernel", &(self.kernel as *const ()))
            .field("data", &self.data)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Observable state of a task handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Waiting in the queue.
    Queued,
    /// A worker is executing the kernel.
    Running,
    /// The handle no longer refers to live work.
    ///
    /// The task completed, and its slot may already hold unrelated work.
    Retired,
}

/// Slot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Free,
    Queued,
    Running,
}

impl SlotState {
    #[inline]
    fn from_u8(val: u8) -> Self {
        match val {
            1 => SlotState::Queued,
            2 => SlotState::Running,
            _ => SlotState::Free,
        }
    }

    #[inline]
    fn as_u8(self) -> u8 {
        match self {
            SlotState::Free => 0,
            SlotState::Queued => 1,
            SlotState::Running => 2,
        }
    }
}

/// Pool slot holding one task.
///
/// `generation` is read lock-free by handle checks; the task itself sits
/// behind a mutex that only the slot's current owner touches.
#[derive(Debug)]
pub(crate) struct TaskSlot {
    generation: CachePadded<AtomicU64>,
    state: AtomicU8,
    task: Mutex<Task>,
}

impl Default for TaskSlot {
    fn default() -> Self {
        Self {
            generation: CachePadded::new(AtomicU64::new(0)),
            state: AtomicU8::new(SlotState::Free.as_u8()),
            task: Mutex::new(Task::default()),
        }
    }
}

impl TaskSlot {
    #[inline]
    pub(crate) fn generation(&self) -> Generation {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Fill a freshly allocated slot and publish its generation.
    pub(crate) fn stamp(
        &self,
        kernel: TaskKernel,
        data: TaskData,
        generation: Generation,
    ) {
        *self.task.lock() = Task::new(kernel, data, generation);
        self.state.store(SlotState::Queued.as_u8(), Ordering::Release);
        self.generation.store(generation, Ordering::Release);
    }

    /// Take the task out for execution.
    pub(crate) fn begin(&self) -> (TaskKernel, TaskData) {
        self.state.store(SlotState::Running.as_u8(), Ordering::Release);
        self.task.lock().take()
    }

    /// Mark the slot free under a new generation, invalidating old handles.
    pub(crate) fn retire(
        &self,
        generation: Generation,
    ) {
        {
            let mut task = self.task.lock();
            task.take();
            task.generation = generation;
        }
        self.state.store(SlotState::Free.as_u8(), Ordering::Release);
        self.generation.store(generation, Ordering::Release);
    }

    /// Status of `id` as seen from this slot.
    pub(crate) fn status_of(
        &self,
        id: TaskId,
    ) -> TaskStatus {
        if id.generation == 0 || self.generation() != id.generation {
            return TaskStatus::Retired;
        }
        match self.state() {
            SlotState::Queued => TaskStatus::Queued,
            SlotState::Running => TaskStatus::Running,
            SlotState::Free => TaskStatus::Retired,
        }
    }
}
