use std::{num::NonZeroUsize, thread};

/// Upper bound on the number of tasks of a single dispatch.
pub const MAX_TASKS: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerCount {
    Auto,
    Manual(NonZeroUsize),
}

impl WorkerCount {
    pub fn get(&self) -> usize {
        match self {
            WorkerCount::Auto => num_cpus::get(),
            WorkerCount::Manual(num) => num.get(),
        }
    }
}

/// Fork/join dispatcher.
///
/// Every dispatch fans out a fixed number of task invocations and blocks the caller until
/// all of them have finished. Task 0 runs on the calling thread. A panic in any task is
/// propagated to the caller after the join.
#[derive(Clone, Debug)]
pub struct TaskPool {
    worker_count: usize,
    max_tasks: usize,
}

impl TaskPool {
    pub fn new(worker_count: WorkerCount) -> TaskPool {
        Self::with_max_tasks(worker_count, MAX_TASKS)
    }

    pub fn with_max_tasks(worker_count: WorkerCount, max_tasks: usize) -> TaskPool {
        assert!(max_tasks > 0);
        TaskPool {
            worker_count: worker_count.get().max(1),
            max_tasks,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Number of tasks a dispatch should use to avoid oversubscription.
    pub fn num_tasks(&self) -> usize {
        self.max_tasks.min(self.worker_count)
    }

    /// Runs `task(i)` for every `i` in `0..num_tasks` and waits for all of them.
    pub fn dispatch<F>(&self, num_tasks: usize, task: F)
    where
        F: Fn(usize) + Sync,
    {
        let mut states = vec![(); num_tasks];
        self.dispatch_with(&mut states, |i, _| task(i));
    }

    /// Runs one task per element of `states`, giving each task exclusive access to its element.
    /// Waits for all of them.
    pub fn dispatch_with<T, F>(&self, states: &mut [T], task: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        let task = &task;
        thread::scope(|scope| {
            let mut states = states.iter_mut().enumerate();
            let first = states.next();
            for (task_index, state) in states {
                scope.spawn(move || task(task_index, state));
            }
            if let Some((task_index, state)) = first {
                task(task_index, state);
            }
        });
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new(WorkerCount::Auto)
    }
}
