use bon::bon;
use thiserror::Error;

use crate::parallel::{MAX_TASKS, TaskPool, WorkerCount};

/// Largest supported SAH block size is `1 << MAX_LOG_BLOCK_SIZE`.
pub const MAX_LOG_BLOCK_SIZE: u32 = 5;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BuildSettings {
    /// Primitive counts in the SAH are rounded up to multiples of `1 << log_block_size`.
    pub log_block_size: u32,
    pub max_leaf_size: usize,
    /// Ranges with at least this many primitives are binned and partitioned in parallel.
    pub parallel_threshold: usize,
    pub worker_count: WorkerCount,
    pub max_tasks: usize,
}

#[bon]
impl BuildSettings {
    #[builder]
    pub fn new(
        #[builder(default = 2)] log_block_size: u32,
        #[builder(default = 4)] max_leaf_size: usize,
        #[builder(default = 4096)] parallel_threshold: usize,
        #[builder(default = WorkerCount::Auto)] worker_count: WorkerCount,
        #[builder(default = MAX_TASKS)] max_tasks: usize,
    ) -> Result<Self, SettingsError> {
        if log_block_size > MAX_LOG_BLOCK_SIZE {
            return Err(SettingsError::LogBlockSizeTooLarge(log_block_size));
        }
        if max_leaf_size == 0 {
            return Err(SettingsError::ZeroLeafSize);
        }
        if max_tasks == 0 || max_tasks > MAX_TASKS {
            return Err(SettingsError::InvalidMaxTasks(max_tasks));
        }

        Ok(BuildSettings {
            log_block_size,
            max_leaf_size,
            parallel_threshold,
            worker_count,
            max_tasks,
        })
    }
}

impl BuildSettings {
    pub fn task_pool(&self) -> TaskPool {
        TaskPool::with_max_tasks(self.worker_count, self.max_tasks)
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings {
            log_block_size: 2,
            max_leaf_size: 4,
            parallel_threshold: 4096,
            worker_count: WorkerCount::Auto,
            max_tasks: MAX_TASKS,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("log block size {0} is above the supported maximum of {max}", max = MAX_LOG_BLOCK_SIZE)]
    LogBlockSizeTooLarge(u32),
    #[error("maximum leaf size must be at least 1")]
    ZeroLeafSize,
    #[error("maximum task count {0} must be between 1 and {max}", max = MAX_TASKS)]
    InvalidMaxTasks(usize),
}
