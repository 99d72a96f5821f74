use super::{
    config::Config,
    errors::{PoolError, SpawnError},
    handle::{Completion, JoinHandle},
    model::{PoolMetrics, PoolState},
    task::{panic_message, Async, Blocking, Fallible, ProcessTask, ProcessOutput, Task},
};
use std::{
    fmt::Display,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::deque::{Injector, Steal};
use futures::{future::BoxFuture, FutureExt};
use tokio::{
    sync::{Mutex, Notify},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

pub type Pool = Arc<WorkerPool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Completed,
    Failed,
}

/// Типонезависимая сторона `Completion`, нужная слоту до запуска задачи
trait Claim: Send + Sync {
    fn claim(&self) -> bool;
}

impl<T: Send + Sync> Claim for Completion<T> {
    fn claim(&self) -> bool {
        self.try_start()
    }
}

struct Job {
    id: u64,
    ticket: Arc<dyn Claim>,
    body: BoxFuture<'static, Disposition>,
}

/// Состояние, разделяемое пулом и его слотами
struct Shared {
    name: String,
    max_workers: usize,
    max_pending: Option<usize>,
    inject: Injector<Job>,
    job_ready: Notify,
    drained: CancellationToken,
    lifecycle: AtomicU8,
    // отправлено, но ещё не в терминальном состоянии
    outstanding: AtomicUsize,
    idle: Notify,
    running: AtomicUsize,
    // задачи, ещё не запущенные и не отменённые
    queued: Arc<AtomicUsize>,
    idle_workers: AtomicUsize,
    next_id: AtomicU64,
    total_submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Shared {
    fn pop(&self) -> Option<Job> {
        loop {
            match self.inject.steal() {
                Steal::Success(job) => return Some(job),
                Steal::Empty => return None,
                Steal::Retry => std::hint::spin_loop(),
            }
        }
    }

    /// Задача достигла терминального состояния (или так и не была принята)
    fn release(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
            if self.lifecycle.load(Ordering::SeqCst) != OPEN {
                self.finish_drain();
            }
        }
    }

    fn begin_close(&self) -> bool {
        if self
            .lifecycle
            .compare_exchange(OPEN, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        info!(
            pool = %self.name,
            outstanding = self.outstanding.load(Ordering::SeqCst),
            "pool closing"
        );
        if self.outstanding.load(Ordering::SeqCst) == 0 {
            self.finish_drain();
        }
        true
    }

    fn finish_drain(&self) {
        if self
            .lifecycle
            .compare_exchange(CLOSING, CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(pool = %self.name, "pool drained");
            self.drained.cancel();
        }
    }

    fn state(&self) -> PoolState {
        match self.lifecycle.load(Ordering::SeqCst) {
            OPEN => PoolState::Open,
            CLOSING => PoolState::Closing,
            _ => PoolState::Closed,
        }
    }

    async fn worker_loop(self: Arc<Self>, slot: usize) {
        debug!(pool = %self.name, slot, "worker started");

        loop {
            // Подписываемся до проверки очереди, чтобы не потерять уведомление
            let notified = self.job_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.pop() {
                self.run_job(slot, job).await;
                continue;
            }
            if self.drained.is_cancelled() {
                break;
            }

            self.idle_workers.fetch_add(1, Ordering::Relaxed);
            tokio::select! {
                _ = &mut notified => {}
                _ = self.drained.cancelled() => {}
            }
            self.idle_workers.fetch_sub(1, Ordering::Relaxed);
        }

        debug!(pool = %self.name, slot, "worker stopped");
    }

    async fn run_job(&self, slot: usize, job: Job) {
        let Job { id, ticket, body } = job;

        if !ticket.claim() {
            trace!(pool = %self.name, slot, task_id = id, "discarding cancelled task");
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            self.release();
            return;
        }

        debug!(pool = %self.name, slot, task_id = id, "task started");
        self.running.fetch_add(1, Ordering::Relaxed);
        let disposition = body.await;
        self.running.fetch_sub(1, Ordering::Relaxed);

        match disposition {
            Disposition::Completed => self.completed.fetch_add(1, Ordering::Relaxed),
            Disposition::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        self.release();
    }
}

/// Пул с фиксированным числом слотов и FIFO-очередью задач
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Result<Pool, PoolError> {
        Self::with_config(Config::with_workers(max_workers))
    }

    /// Слоты запускаются сразу; требуется работающий tokio runtime
    pub fn with_config(config: Config) -> Result<Pool, PoolError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let shared = Arc::new(Shared {
            name: config.name,
            max_workers: config.max_workers,
            max_pending: config.max_pending,
            inject: Injector::new(),
            job_ready: Notify::new(),
            drained: CancellationToken::new(),
            lifecycle: AtomicU8::new(OPEN),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
            running: AtomicUsize::new(0),
            queued: Arc::new(AtomicUsize::new(0)),
            idle_workers: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            total_submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        });

        let workers = (0..shared.max_workers)
            .map(|slot| runtime.spawn(Arc::clone(&shared).worker_loop(slot)))
            .collect();

        info!(
            pool = %shared.name,
            workers = shared.max_workers,
            max_pending = ?shared.max_pending,
            "worker pool created"
        );

        Ok(Arc::new(WorkerPool {
            shared,
            workers: Mutex::new(workers),
        }))
    }

    /// Открывает новый пул, выполняет `body` и всегда дожидается полного
    /// завершения пула, даже если `body` запаниковал (паника пробрасывается дальше)
    pub async fn scoped<F, Fut, R>(config: Config, body: F) -> Result<R, PoolError>
    where
        F: FnOnce(Pool) -> Fut,
        Fut: Future<Output = R>,
    {
        let pool = Self::with_config(config)?;
        Ok(pool.scope(body).await)
    }

    /// То же, что `scoped`, но для уже созданного пула
    pub async fn scope<F, Fut, R>(self: &Arc<Self>, body: F) -> R
    where
        F: FnOnce(Pool) -> Fut,
        Fut: Future<Output = R>,
    {
        let outcome = AssertUnwindSafe(async { body(Arc::clone(self)).await })
            .catch_unwind()
            .await;
        self.shutdown().await;
        match outcome {
            Ok(out) => out,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Ставит задачу в очередь и сразу возвращает handle
    pub fn submit<T: Task>(&self, task: T) -> Result<JoinHandle<T::Output>, PoolError> {
        let shared = &self.shared;

        // Резерв виден конкурентному close() раньше, чем мы проверим состояние
        shared.outstanding.fetch_add(1, Ordering::SeqCst);
        if shared.lifecycle.load(Ordering::SeqCst) != OPEN {
            shared.release();
            return Err(PoolError::Closed);
        }

        let queued = shared.queued.fetch_add(1, Ordering::Relaxed);
        if let Some(capacity) = shared.max_pending {
            if queued >= capacity {
                shared.queued.fetch_sub(1, Ordering::Relaxed);
                shared.release();
                return Err(PoolError::QueueFull { capacity });
            }
        }

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let completion = Arc::new(Completion::new(id, Arc::clone(&shared.queued)));
        let handle = JoinHandle::new(Arc::clone(&completion));
        let ticket: Arc<dyn Claim> = completion.clone();

        let pool_name = shared.name.clone();
        let body = async move {
            // Паника в чужой реализации Task не должна убивать слот
            let outcome = AssertUnwindSafe(async move { task.run().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(SpawnError::Panic(panic_message(panic.as_ref()))));
            let disposition = match &outcome {
                Ok(_) => Disposition::Completed,
                Err(err) => {
                    warn!(pool = %pool_name, task_id = id, error = %err, "task failed");
                    Disposition::Failed
                }
            };
            completion.finish(outcome);
            disposition
        };

        shared.total_submitted.fetch_add(1, Ordering::Relaxed);
        shared.inject.push(Job {
            id,
            ticket,
            body: body.boxed(),
        });
        shared.job_ready.notify_one();
        trace!(pool = %shared.name, task_id = id, "task queued");

        Ok(handle)
    }

    pub fn spawn_blocking<F, R>(&self, f: F) -> Result<JoinHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + Sync + 'static,
    {
        self.submit(Blocking(f))
    }

    /// Блокирующее замыкание; `Err` из него становится `SpawnError::Failed`
    pub fn try_spawn_blocking<F, R, E>(&self, f: F) -> Result<JoinHandle<R>, PoolError>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + Sync + 'static,
        E: Display + Send + 'static,
    {
        self.submit(Fallible(f))
    }

    pub fn spawn<Fut>(&self, fut: Fut) -> Result<JoinHandle<Fut::Output>, PoolError>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + Sync + 'static,
    {
        self.submit(Async(fut))
    }

    pub fn spawn_process(&self, task: ProcessTask) -> Result<JoinHandle<ProcessOutput>, PoolError> {
        self.submit(task)
    }

    #[inline]
    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    #[inline]
    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        let shared = &self.shared;
        PoolMetrics {
            max_workers: shared.max_workers,
            running_tasks: shared.running.load(Ordering::Relaxed),
            idle_workers: shared.idle_workers.load(Ordering::Relaxed),
            queued_tasks: shared.queued.load(Ordering::Relaxed),
            total_submitted: shared.total_submitted.load(Ordering::Relaxed),
            completed_tasks: shared.completed.load(Ordering::Relaxed),
            failed_tasks: shared.failed.load(Ordering::Relaxed),
            cancelled_tasks: shared.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Ждёт, пока все уже отправленные задачи завершатся; пул остаётся открытым
    pub async fn join_all(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn join_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join_all()).await.is_ok()
    }

    /// Перестаёт принимать задачи и возвращается сразу.
    /// Очередь дорабатывает в фоне, после чего пул переходит в `Closed`.
    pub fn close(&self) {
        self.shared.begin_close();
    }

    /// Ждёт перехода в `Closed`, сам пул не закрывает
    pub async fn drained(&self) {
        self.shared.drained.cancelled().await;
    }

    /// Закрывает пул и ждёт завершения всех задач и слотов. Повторный вызов ничего не делает.
    pub async fn shutdown(&self) {
        self.close();
        self.drained().await;

        // Слот убирается из списка только после выхода, конкурентные вызовы ждут на lock
        let mut workers = self.workers.lock().await;
        while let Some(worker) = workers.last_mut() {
            let joined = worker.await;
            workers.pop();
            if let Err(err) = joined {
                warn!(pool = %self.shared.name, error = %err, "worker exited abnormally");
            }
        }
    }

    /// `false` если за `timeout` пул не успел опустеть; дренаж при этом продолжается
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.shutdown()).await.is_ok()
    }

    /// Мониторинг метрик с callback
    /// ВАЖНО: Вызовите token.cancel() для остановки мониторинга и освобождения памяти
    pub fn start_monitoring<F>(self: &Arc<Self>, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(pool.metrics());
                    }
                    _ = token_clone.cancelled() => {
                        drop(pool);
                        break;
                    }
                }
            }
        });

        token
    }

    /// Остановить мониторинг и дропнуть все ссылки
    pub fn stop_monitoring(token: CancellationToken) {
        token.cancel();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("max_workers", &self.shared.max_workers)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Слоты доработают очередь и завершатся сами
        self.shared.begin_close();
    }
}
