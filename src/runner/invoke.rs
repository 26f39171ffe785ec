//! Task invocation
//!
//! A task body settles through exactly one of four conventions: a plain
//! return value, a deferred result (future), a push stream, or a completion
//! callback. [`invoke`] drives whichever one the [`TaskFn`] declares and
//! yields a single outcome.

use crate::error::{ExecutionError, Result, TaskFailure};
use crate::runner::context::TaskScope;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A signal emitted by a push stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A discrete data item
    Data(Value),

    /// Terminal failure
    Error(TaskFailure),

    /// Normal end of stream
    End,
}

/// Source of [`StreamEvent`]s. `None` means the stream is exhausted.
#[async_trait]
pub trait PushStream: Send {
    async fn next_event(&mut self) -> Option<StreamEvent>;
}

#[async_trait]
impl PushStream for mpsc::Receiver<StreamEvent> {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        self.recv().await
    }
}

#[async_trait]
impl PushStream for mpsc::UnboundedReceiver<StreamEvent> {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        self.recv().await
    }
}

/// What a directly-called task hands back
pub enum Invocation {
    /// Already settled
    Value(Value),

    /// Settles when the future completes
    Deferred(BoxFuture<'static, anyhow::Result<Value>>),

    /// Settles when the stream ends or errors
    Stream(Box<dyn PushStream>),
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Invocation::Deferred(_) => f.write_str("Deferred(..)"),
            Invocation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

type DirectFn = dyn Fn(TaskScope, Value) -> anyhow::Result<Invocation> + Send + Sync;
type CallbackFn = dyn Fn(TaskScope, Value, Completion) -> anyhow::Result<()> + Send + Sync;

/// A task body
#[derive(Clone)]
pub enum TaskFn {
    /// Called with `(scope, config)`; the return value decides how it settles
    Direct(Arc<DirectFn>),

    /// Called with `(scope, config, completion)`; settles through the handle
    Callback(Arc<CallbackFn>),
}

impl TaskFn {
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(TaskScope, Value) -> anyhow::Result<Invocation> + Send + Sync + 'static,
    {
        TaskFn::Direct(Arc::new(f))
    }

    /// A task that returns its result synchronously
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(TaskScope, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::direct(move |scope, config| f(scope, config).map(Invocation::Value))
    }

    /// A task that returns a future
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskScope, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::direct(move |scope, config| Ok(Invocation::Deferred(Box::pin(f(scope, config)))))
    }

    /// A task that returns a push stream
    pub fn stream<F, S>(f: F) -> Self
    where
        F: Fn(TaskScope, Value) -> anyhow::Result<S> + Send + Sync + 'static,
        S: PushStream + 'static,
    {
        Self::direct(move |scope, config| {
            let stream = f(scope, config)?;
            Ok(Invocation::Stream(Box::new(stream)))
        })
    }

    /// A task that signals completion through a [`Completion`] handle.
    ///
    /// Returning `Err` settles the task as failed unless the handle was
    /// already used.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(TaskScope, Value, Completion) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        TaskFn::Callback(Arc::new(f))
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFn::Direct(_) => f.write_str("TaskFn::Direct"),
            TaskFn::Callback(_) => f.write_str("TaskFn::Callback"),
        }
    }
}

type Outcome = std::result::Result<Value, TaskFailure>;

/// Settles once; later signals are ignored
struct Settlement {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Settlement {
    fn settle(&self, outcome: Outcome) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

/// Completion handle handed to callback-style tasks.
///
/// Clones share one settlement: the first signal wins and every later one
/// returns `false`. Dropping every clone without signalling abandons the
/// task.
#[derive(Clone)]
pub struct Completion {
    settlement: Arc<Settlement>,
}

impl Completion {
    fn new(sender: oneshot::Sender<Outcome>) -> Self {
        Completion {
            settlement: Arc::new(Settlement {
                sender: Mutex::new(Some(sender)),
            }),
        }
    }

    /// Settle with a result
    pub fn done(&self, result: anyhow::Result<Value>) -> bool {
        self.settlement.settle(result.map_err(TaskFailure::from))
    }

    /// Settle successfully
    pub fn succeed(&self, value: Value) -> bool {
        self.settlement.settle(Ok(value))
    }

    /// Settle with a failure
    pub fn fail(&self, error: impl Into<anyhow::Error>) -> bool {
        self.settlement.settle(Err(TaskFailure::new(error)))
    }

    /// Error-first signal: a present error fails, otherwise `value`
    /// (or null) is the result.
    pub fn call(&self, error: Option<anyhow::Error>, value: Option<Value>) -> bool {
        match error {
            Some(error) => self.fail(error),
            None => self.succeed(value.unwrap_or(Value::Null)),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_settled()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Invoke `task` with `config` and wait for its single outcome.
///
/// Failures reported by the task come back as
/// [`ExecutionError::Failed`] carrying the task's own reason.
pub async fn invoke(task: &TaskFn, scope: TaskScope, config: Value) -> Result<Value> {
    match task {
        TaskFn::Direct(f) => match f(scope, config) {
            Ok(invocation) => settle(invocation).await,
            Err(error) => Err(TaskFailure::from(error).into()),
        },
        TaskFn::Callback(f) => {
            let name = scope.task().to_string();
            let (sender, receiver) = oneshot::channel();
            let completion = Completion::new(sender);

            if let Err(error) = f(scope, config, completion.clone()) {
                completion.fail(error);
            }
            drop(completion);

            match receiver.await {
                Ok(outcome) => outcome.map_err(Into::into),
                Err(_) => Err(ExecutionError::Abandoned(name).into()),
            }
        }
    }
}

async fn settle(invocation: Invocation) -> Result<Value> {
    match invocation {
        Invocation::Value(value) => Ok(value),
        Invocation::Deferred(future) => future.await.map_err(|e| TaskFailure::from(e).into()),
        Invocation::Stream(stream) => drain(stream).await,
    }
}

/// Consume a stream for its side effects; the first error halts it
async fn drain(mut stream: Box<dyn PushStream>) -> Result<Value> {
    let mut items = 0usize;
    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Data(_) => items += 1,
            StreamEvent::Error(failure) => return Err(failure.into()),
            StreamEvent::End => break,
        }
    }
    trace!(items, "stream finished");
    Ok(Value::Null)
}
