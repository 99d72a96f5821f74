//! Единица работы для пула.
//!
//! Планировщик ничего не знает о том, где выполняется задача: он получает
//! `Task`, превращает его в future и ждёт результат внутри слота.
//! Замыкания выполняются на blocking-потоках tokio, future - прямо в слоте,
//! `ProcessTask` - в отдельном дочернем процессе.

use super::{errors::SpawnError, result::SpawnResult};
use futures::{future::BoxFuture, FutureExt};
use std::{
    any::Any,
    ffi::{OsStr, OsString},
    fmt::Display,
    future::Future,
    panic::AssertUnwindSafe,
    path::PathBuf,
    process::Stdio,
};

pub trait Task: Send + 'static {
    type Output: Send + Sync + 'static;

    /// Вызывается ровно один раз, когда слот берёт задачу из очереди
    fn run(self) -> BoxFuture<'static, SpawnResult<Self::Output>>;
}

/// Блокирующее замыкание
pub struct Blocking<F>(pub F);

impl<F, R> Task for Blocking<F>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + Sync + 'static,
{
    type Output = R;

    fn run(self) -> BoxFuture<'static, SpawnResult<R>> {
        run_blocking(self.0).boxed()
    }
}

/// Блокирующее замыкание, возвращающее `Result`: `Err` становится `SpawnError::Failed`
pub struct Fallible<F>(pub F);

impl<F, R, E> Task for Fallible<F>
where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + Sync + 'static,
    E: Display + Send + 'static,
{
    type Output = R;

    fn run(self) -> BoxFuture<'static, SpawnResult<R>> {
        run_blocking(self.0)
            .map(|res| res.and_then(|inner| inner.map_err(|e| SpawnError::Failed(e.to_string()))))
            .boxed()
    }
}

/// Асинхронная задача, выполняется прямо внутри слота
pub struct Async<Fut>(pub Fut);

impl<Fut> Task for Async<Fut>
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + Sync + 'static,
{
    type Output = Fut::Output;

    fn run(self) -> BoxFuture<'static, SpawnResult<Fut::Output>> {
        AssertUnwindSafe(self.0)
            .catch_unwind()
            .map(|res| res.map_err(|panic_info| SpawnError::Panic(panic_message(panic_info.as_ref()))))
            .boxed()
    }
}

/// Программа с аргументами, запускаемая отдельным процессом
#[derive(Debug, Clone)]
pub struct ProcessTask {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl ProcessTask {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs.push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Вывод успешно завершившегося процесса
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

impl Task for ProcessTask {
    type Output = ProcessOutput;

    fn run(self) -> BoxFuture<'static, SpawnResult<ProcessOutput>> {
        async move {
            let output = self
                .command()
                .output()
                .await
                .map_err(|e| SpawnError::Spawn(format!("{}: {e}", self.program.to_string_lossy())))?;

            if !output.status.success() {
                return Err(SpawnError::Exit {
                    code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
                });
            }
            Ok(ProcessOutput {
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
        .boxed()
    }
}

async fn run_blocking<F, R>(f: F) -> SpawnResult<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || std::panic::catch_unwind(AssertUnwindSafe(f))).await;
    match joined {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(panic_info)) => Err(SpawnError::Panic(panic_message(panic_info.as_ref()))),
        Err(join_err) => Err(SpawnError::JoinFailed(join_err.to_string())),
    }
}

pub(crate) fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic_info.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic_info.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic in spawned task".to_string()
    }
}
