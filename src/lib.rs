//! Пул с ограниченным числом слотов для параллельного выполнения задач
//!
//! # Features
//! - Фиксированное число слотов, FIFO-очередь без приоритетов
//! - Handle на каждую задачу: значение, ошибка, timeout ожидания
//! - Изоляция ошибок: паника в задаче не затрагивает пул и другие задачи
//! - Отмена задач, ещё стоящих в очереди
//! - Graceful shutdown с дренажом очереди и scoped-использование
//! - Блокирующие замыкания, async future и дочерние процессы
//! - Метрики и мониторинг

pub mod config;
pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod result;
pub mod task;

pub use config::Config;
pub use errors::{PoolError, SpawnError};
pub use handle::{join_handles, JoinHandle};
pub use model::{JoinOrdering, PoolMetrics, PoolState};
pub use pool::{Pool, WorkerPool};
pub use result::{SpawnResult, TaskStatus};
pub use task::{ProcessOutput, ProcessTask, Task};
