use crate::task::{Status, Task};

/// Counters shown above the task table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub pending: usize,
}

impl Summary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(
            Self {
                total: tasks.len(),
                ..Self::default()
            },
            |mut acc, task| {
                match task.status {
                    Status::Pending => acc.pending += 1,
                    Status::InProgress => acc.in_progress += 1,
                    Status::Completed => acc.completed += 1,
                }
                acc
            },
        )
    }
}
