//! Parallel variants of binning, partitioning and list splitting.

mod binner;
mod list;
mod task_pool;

pub use binner::{ParallelBinner, TaskPartition};
pub use list::{evaluate_split_list_parallel, evaluate_split_parallel, split_list_parallel};
pub use task_pool::{MAX_TASKS, TaskPool, WorkerCount};
