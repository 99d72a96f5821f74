use super::errors::SpawnError;

pub type SpawnResult<T> = Result<T, SpawnError>;

/// Состояние задачи, видимое через handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }

    pub(crate) fn from_outcome<T>(outcome: &SpawnResult<T>) -> Self {
        match outcome {
            Ok(_) => TaskStatus::Completed,
            Err(SpawnError::Cancelled) => TaskStatus::Cancelled,
            Err(_) => TaskStatus::Failed,
        }
    }
}
