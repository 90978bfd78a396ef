//! Dispatcher 单元测试
//!
//! 测试任务句柄、任务数据、配置和调度器的行为


use crate::runtime::dispatch::{
    DispatchError, DispatcherConfig, RunState, StreamData, Task, TaskData, TaskId, MAX_WORKERS,
    STREAM_WIDTH,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn bump(data: &TaskData) {
    if let Some(counter) = data.get::<AtomicUsize>() {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod task_id_tests {
    use super::*;

    #[test]
    fn test_task_id_new() {
        let id = TaskId::new(3, 7);
        assert_eq!(id.offset(), 3);
        assert_eq!(id.generation(), 7);
    }

    #[test]
    fn test_task_id_default_is_never_issued() {
        let id = TaskId::default();
        assert_eq!(id.generation(), 0);
    }

    #[test]
    fn test_task_id_eq_hash() {
        let mut set = HashSet::new();
        set.insert(TaskId::new(1, 2));
        set.insert(TaskId::new(1, 2));
        set.insert(TaskId::new(1, 3));
        set.insert(TaskId::new(2, 2));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId::new(4, 19).to_string(), "Task(4#19)");
    }
}

#[cfg(test)]
mod task_data_tests {
    use super::*;

    #[test]
    fn test_task_data_default_is_empty() {
        let data = TaskData::default();
        assert!(data.is_empty());
        assert!(data.get::<u32>().is_none());
        assert!(data.stream().is_none());
    }

    #[test]
    fn test_task_data_context_downcast() {
        let data = TaskData::context(42u32);
        assert_eq!(data.get::<u32>(), Some(&42));
        assert!(data.get::<u64>().is_none());
        assert!(data.stream().is_none());
    }

    #[test]
    fn test_task_data_shared_context() {
        let counter = Arc::new(AtomicUsize::new(0));
        let data = TaskData::shared(counter.clone());
        bump(&data);
        bump(&data);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_task_data_debug() {
        assert_eq!(format!("{:?}", TaskData::Empty), "Empty");
        assert_eq!(format!("{:?}", TaskData::context(1u8)), "Context(..)");
        let stream: TaskData = StreamData::new().with_input(0, Arc::new(1u8)).into();
        assert!(format!("{:?}", stream).contains("inputs: 1"));
    }
}

#[cfg(test)]
mod stream_tests {
    use super::*;

    #[test]
    fn test_stream_inputs_outputs() {
        let sum = Arc::new(AtomicUsize::new(0));
        let stream = StreamData::new()
            .with_input(0, Arc::new(2usize))
            .with_input(3, Arc::new(5usize))
            .with_output(1, sum.clone());

        assert_eq!(stream.input_count(), 2);
        assert_eq!(stream.output_count(), 1);
        assert_eq!(stream.input::<usize>(0), Some(&2));
        assert_eq!(stream.input::<usize>(3), Some(&5));
        assert!(stream.input::<usize>(1).is_none());
        assert!(stream.input::<u8>(0).is_none());
        assert!(stream.input::<usize>(STREAM_WIDTH).is_none());
        assert!(stream.output::<AtomicUsize>(1).is_some());
    }

    #[test]
    fn test_stream_kernel_fan_in() {
        fn add_inputs(data: &TaskData) {
            let stream = data.stream().unwrap();
            let total: usize = (0..STREAM_WIDTH)
                .filter_map(|i| stream.input::<usize>(i))
                .sum();
            stream
                .output::<AtomicUsize>(0)
                .unwrap()
                .store(total, Ordering::SeqCst);
        }

        let out = Arc::new(AtomicUsize::new(0));
        let mut stream = StreamData::new().with_output(0, out.clone());
        for i in 0..STREAM_WIDTH {
            stream = stream.with_input(i, Arc::new(i + 1));
        }

        let task = Task::new(add_inputs, stream.into(), 1);
        task.execute();
        assert_eq!(out.load(Ordering::SeqCst), 1 + 2 + 3 + 4);
    }

    #[test]
    #[should_panic]
    fn test_stream_input_out_of_range_panics() {
        let _ = StreamData::new().with_input(STREAM_WIDTH, Arc::new(0u8));
    }
}

#[cfg(test)]
mod task_tests {
    use super::*;

    #[test]
    fn test_task_default() {
        let task = Task::default();
        assert_eq!(task.generation(), 0);
        assert!(task.data().is_empty());
        task.execute();
    }

    #[test]
    fn test_task_execute() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = Task::new(bump, TaskData::shared(counter.clone()), 9);
        assert_eq!(task.generation(), 9);
        task.execute();
        task.execute();
        (task.kernel())(task.data());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_task_debug() {
        let debug = format!("{:?}", Task::default());
        assert!(debug.contains("Task"));
        assert!(debug.contains("generation"));
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DispatcherConfig::default();
        assert!(config.num_workers >= 1);
        assert_eq!(config.pool_slots, 1024);
        assert_eq!(config.pool_bytes, None);
        assert_eq!(config.submit_timeout(), None);
        assert_eq!(config.thread_name, "task-worker");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DispatcherConfig::new(2, 16)
            .with_submit_timeout(Duration::from_millis(250))
            .with_thread_name("render")
            .with_stack_size(256 * 1024)
            .with_pool_bytes(4096);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.pool_slots, 16);
        assert_eq!(config.pool_bytes, Some(4096));
        assert_eq!(config.submit_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.thread_name, "render");
        assert_eq!(config.stack_size, Some(256 * 1024));
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let err = DispatcherConfig::new(0, 8).validate().unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_rejects_zero_slots() {
        let err = DispatcherConfig::new(1, 0).validate().unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
        // A byte budget takes over from the slot count.
        assert!(DispatcherConfig::new(1, 0)
            .with_pool_bytes(1 << 16)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_config_rejects_huge_worker_count() {
        assert!(DispatcherConfig::new(MAX_WORKERS, 8).validate().is_ok());
        let err = DispatcherConfig::new(MAX_WORKERS + 1, 8)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
        assert!(matches!(
            DispatcherConfig::new(usize::MAX, 8).validate(),
            Err(DispatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_submit_timeout_saturates() {
        let config = DispatcherConfig::new(1, 1).with_submit_timeout(Duration::MAX);
        assert_eq!(config.submit_timeout_ms, Some(u64::MAX));
    }

    #[test]
    fn test_config_rejects_empty_thread_name() {
        let err = DispatcherConfig::new(1, 1)
            .with_thread_name("")
            .validate()
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_run_state_default() {
        assert_eq!(RunState::default(), RunState::Stopped);
    }
}
