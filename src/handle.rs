use super::{
    errors::SpawnError,
    model::JoinOrdering,
    result::{SpawnResult, TaskStatus},
};
use futures::{
    future::{self, BoxFuture},
    stream::{FuturesUnordered, StreamExt},
    FutureExt,
};
use std::{
    future::IntoFuture,
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Общая ячейка результата: пул пишет её ровно один раз, handle читает сколько угодно
pub(crate) struct Completion<T> {
    id: u64,
    state: AtomicU8,
    outcome: OnceLock<SpawnResult<T>>,
    done: CancellationToken,
    // счётчик очереди пула: уменьшается ровно один раз, при старте или отмене
    backlog: Arc<AtomicUsize>,
}

impl<T> Completion<T> {
    pub(crate) fn new(id: u64, backlog: Arc<AtomicUsize>) -> Self {
        Self {
            id,
            state: AtomicU8::new(QUEUED),
            outcome: OnceLock::new(),
            done: CancellationToken::new(),
            backlog,
        }
    }

    /// Слот забирает задачу; `false` если её успели отменить
    pub(crate) fn try_start(&self) -> bool {
        let won = self
            .state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.backlog.fetch_sub(1, Ordering::Relaxed);
        }
        won
    }

    pub(crate) fn finish(&self, outcome: SpawnResult<T>) {
        if self.outcome.set(outcome).is_ok() {
            self.done.cancel();
        }
    }

    fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.backlog.fetch_sub(1, Ordering::Relaxed);
            self.finish(Err(SpawnError::Cancelled));
        }
        won
    }

    fn status(&self) -> TaskStatus {
        match self.outcome.get() {
            Some(outcome) => TaskStatus::from_outcome(outcome),
            None if self.state.load(Ordering::Acquire) == QUEUED => TaskStatus::Queued,
            None => TaskStatus::Running,
        }
    }
}

/// Handle на задачу с поддержкой отмены и timeout.
///
/// Клонируется свободно: все клоны видят один и тот же результат.
/// Drop handle не отменяет задачу.
pub struct JoinHandle<T> {
    completion: Arc<Completion<T>>,
}

impl<T> Clone for JoinHandle<T> {
    fn clone(&self) -> Self {
        Self {
            completion: Arc::clone(&self.completion),
        }
    }
}

impl<T> std::fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.completion.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(completion: Arc<Completion<T>>) -> Self {
        Self { completion }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.completion.id
    }

    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.completion.status()
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.completion.outcome.get().is_some()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    /// Отменяет задачу, пока она стоит в очереди.
    /// Запущенную задачу прервать нельзя: тогда возвращается `false`.
    pub fn cancel(&self) -> bool {
        self.completion.cancel()
    }

    /// Результат без ожидания, если задача уже завершилась
    pub fn peek(&self) -> Option<&SpawnResult<T>> {
        self.completion.outcome.get()
    }

    /// Ждёт завершения и отдаёт ссылку на результат (без требования `Clone`)
    pub async fn outcome(&self) -> &SpawnResult<T> {
        loop {
            if let Some(outcome) = self.completion.outcome.get() {
                return outcome;
            }
            self.completion.done.cancelled().await;
        }
    }
}

impl<T: Clone> JoinHandle<T> {
    pub async fn result(&self) -> SpawnResult<T> {
        self.outcome().await.clone()
    }

    /// Timeout только прекращает ожидание, сама задача продолжает работать
    pub async fn result_timeout(&self, timeout: Duration) -> SpawnResult<T> {
        match tokio::time::timeout(timeout, self.outcome()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => Err(SpawnError::Timeout(timeout)),
        }
    }
}

impl<T> IntoFuture for JoinHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = SpawnResult<T>;
    type IntoFuture = BoxFuture<'static, SpawnResult<T>>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.result().await }.boxed()
    }
}

/// Собирает результаты нескольких задач.
/// `Ordered` - в порядке handles, `UnOrdered` - в порядке завершения.
pub async fn join_handles<T>(handles: Vec<JoinHandle<T>>, ordering: JoinOrdering) -> Vec<SpawnResult<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if handles.is_empty() {
        return Vec::new();
    }

    match ordering {
        JoinOrdering::Ordered => future::join_all(handles.iter().map(|h| h.result())).await,
        JoinOrdering::UnOrdered => {
            handles
                .into_iter()
                .map(IntoFuture::into_future)
                .collect::<FuturesUnordered<_>>()
                .collect()
                .await
        }
    }
}
