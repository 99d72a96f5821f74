use std::time::Duration;
use thiserror::Error;

/// Ошибки управления пулом: создание, отправка задач
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    #[error("pool is not accepting new tasks")]
    Closed,

    #[error("task queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("worker pool must be created inside a tokio runtime")]
    NoRuntime,
}

impl PoolError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        PoolError::Configuration(msg.into())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::Closed)
    }
}

/// Результат отдельной задачи, если она не вернула значение
#[derive(Debug, Error, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub enum SpawnError {
    #[error("task panicked: {0}")]
    Panic(String),

    #[error("task failed: {0}")]
    Failed(String),

    #[error("process exited with {}: {stderr}", exit_label(.code))]
    Exit { code: Option<i32>, stderr: String },

    #[error("failed to start process: {0}")]
    Spawn(String),

    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("task was cancelled before it started")]
    Cancelled,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "signal".to_string(),
    }
}

impl SpawnError {
    /// Ошибка пришла из тела задачи (а не из ожидания или отмены)
    pub fn is_task_failure(&self) -> bool {
        !matches!(self, SpawnError::Timeout(_) | SpawnError::Cancelled)
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, SpawnError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_classification() {
        assert!(SpawnError::Panic("boom".into()).is_task_failure());
        assert!(SpawnError::Failed("bad input".into()).is_task_failure());
        assert!(!SpawnError::Cancelled.is_task_failure());
        assert!(!SpawnError::Timeout(Duration::from_millis(5)).is_task_failure());
        assert!(SpawnError::Timeout(Duration::from_millis(5)).is_timeout());
    }

    #[test]
    fn test_display() {
        let err = SpawnError::Exit { code: Some(3), stderr: "nope".into() };
        assert_eq!(err.to_string(), "process exited with code 3: nope");

        let err = SpawnError::Exit { code: None, stderr: String::new() };
        assert!(err.to_string().contains("signal"));

        let err = PoolError::QueueFull { capacity: 8 };
        assert!(err.to_string().contains('8'));
        assert!(PoolError::Closed.is_closed());
    }
}
