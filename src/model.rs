#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    pub max_workers: usize,
    pub running_tasks: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
}

impl PoolMetrics {
    /// Доля занятых слотов
    pub fn utilization(&self) -> f64 {
        if self.max_workers == 0 {
            return 0.0;
        }
        self.running_tasks as f64 / self.max_workers as f64
    }

    /// Сколько задач в очереди приходится на один слот
    pub fn queue_pressure(&self) -> f64 {
        if self.max_workers == 0 {
            return 0.0;
        }
        self.queued_tasks as f64 / self.max_workers as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}


/// Жизненный цикл пула: `Open -> Closing -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Open,
    Closing,
    Closed,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOrdering {
    Ordered,
    UnOrdered,
}
