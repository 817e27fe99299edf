//! Task Controllers
//!
//! Drive one long-running asynchronous loop body as a cancellable,
//! restartable unit of work.
//!
//! # State Machine
//!
//! ```text
//!            begin              cancel            loop exited
//!   Idle ──────────► Active ──────────► Cancelling ──────────► Idle
//!     │                │
//!     └──── dispose ───┴──────────────────────────────────────► Disposed
//! ```
//!
//! [`TaskController`] runs the body once. [`RetryTaskController`] re-runs it
//! forever with a fixed pause in between, publishing [`TaskEvent`]s so the
//! owner can observe failures and pauses.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

/// Default pause between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Loop body run by a controller. Invoked with a fresh token on every run.
pub type TaskAction =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`TaskAction`].
pub fn task_action<F, Fut>(f: F) -> TaskAction
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |token| f(token).boxed())
}

/// Marker error for a loop body that stopped because it was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Whether a loop body error is part of the shutdown path.
#[must_use]
pub fn is_cancellation(error: &anyhow::Error, token: &CancellationToken) -> bool {
    token.is_cancelled() || error.is::<Cancelled>()
}

/// Run `action` once, turning a panic in the body into an error.
async fn run_guarded(action: &TaskAction, token: CancellationToken) -> anyhow::Result<()> {
    match AssertUnwindSafe(async { action(token).await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("task panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No loop running.
    Idle,
    /// Loop running.
    Active,
    /// Cancellation requested, loop not yet exited.
    Cancelling,
    /// Controller disposed; it can no longer begin.
    Disposed,
}

/// Lifecycle notification published by a controller.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A run ended and the controller is waiting before the next one.
    Pausing {
        /// Pause length.
        delay: Duration,
    },
    /// The pause elapsed and the next run is starting.
    Resuming,
    /// A run failed.
    Error(Arc<anyhow::Error>),
}

/// Controller error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Controller was disposed.
    #[error("task controller has been disposed")]
    Disposed,

    /// No action was given and none was stored by an earlier `begin`.
    #[error("no action to begin")]
    MissingAction,

    /// A cancellation is still waiting for the previous loop to exit.
    #[error("previous task is still cancelling")]
    CancelPending,

    /// `begin` was called outside a Tokio runtime.
    #[error("no Tokio runtime available to spawn the task")]
    NoRuntime,
}

type DoneFuture = Shared<BoxFuture<'static, ()>>;

/// Frees the controller when the spawned loop ends, however it ends. A
/// cancelled loop is finalized by `cancel` instead.
struct ExitGuard {
    inner: Arc<Mutex<Inner>>,
    generation: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.generation == self.generation && inner.state == TaskState::Active {
            inner.state = TaskState::Idle;
            inner.token = None;
            inner.done = None;
        }
    }
}

struct Inner {
    state: TaskState,
    action: Option<TaskAction>,
    token: Option<CancellationToken>,
    done: Option<DoneFuture>,
    generation: u64,
}

// =============================================================================
// Task Controller
// =============================================================================

/// Runs a loop body once per `begin`, cancellable and restartable.
pub struct TaskController {
    name: Arc<str>,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<TaskEvent>,
}

impl fmt::Debug for TaskController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskController")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TaskController {
    /// Create an idle controller.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: Arc::from(name.into()),
            inner: Arc::new(Mutex::new(Inner {
                state: TaskState::Idle,
                action: None,
                token: None,
                done: None,
                generation: 0,
            })),
            events,
        }
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    /// Whether a loop is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TaskState::Active
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Start the loop body.
    ///
    /// Uses `action` if given, otherwise the action stored by the previous
    /// call. Does nothing if a loop is already running. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Disposed`] after [`dispose`](Self::dispose),
    /// [`TaskError::MissingAction`] when there is nothing to run, and
    /// [`TaskError::CancelPending`] while a cancellation is in flight.
    pub fn begin(&self, action: Option<TaskAction>) -> Result<(), TaskError> {
        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Disposed => return Err(TaskError::Disposed),
            TaskState::Active => return Ok(()),
            TaskState::Cancelling => return Err(TaskError::CancelPending),
            TaskState::Idle => {}
        }

        if let Some(action) = action {
            inner.action = Some(action);
        }
        let action = inner.action.clone().ok_or(TaskError::MissingAction)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TaskError::NoRuntime)?;

        let token = CancellationToken::new();
        inner.generation += 1;
        let generation = inner.generation;

        let guard = ExitGuard {
            inner: Arc::clone(&self.inner),
            generation,
        };
        let events = self.events.clone();
        let name = Arc::clone(&self.name);
        let run_token = token.clone();

        let handle = runtime.spawn(async move {
            let _guard = guard;
            tracing::debug!(task = %name, "Task started");

            if let Err(error) = run_guarded(&action, run_token.clone()).await {
                if is_cancellation(&error, &run_token) {
                    tracing::debug!(task = %name, "Task cancelled");
                } else {
                    tracing::error!(task = %name, error = %format!("{error:#}"), "Task failed");
                    let _ = events.send(TaskEvent::Error(Arc::new(error)));
                }
            }
            tracing::debug!(task = %name, "Task exited");
        });

        inner.token = Some(token);
        inner.done = Some(handle.map(|_| ()).boxed().shared());
        inner.state = TaskState::Active;
        Ok(())
    }

    /// Request cancellation and wait for the running loop to exit.
    ///
    /// No-op when idle. Concurrent callers all wait for the same exit.
    pub async fn cancel(&self) {
        let (done, generation) = {
            let mut inner = self.inner.lock();
            match inner.state {
                TaskState::Active => {
                    if let Some(token) = &inner.token {
                        token.cancel();
                    }
                    inner.state = TaskState::Cancelling;
                    tracing::debug!(task = %self.name, "Task cancelling");
                    (inner.done.clone(), inner.generation)
                }
                TaskState::Cancelling => (inner.done.clone(), inner.generation),
                TaskState::Idle | TaskState::Disposed => return,
            }
        };

        if let Some(done) = done {
            done.await;
        }

        let mut inner = self.inner.lock();
        if inner.generation == generation && inner.state == TaskState::Cancelling {
            inner.state = TaskState::Idle;
            inner.token = None;
            inner.done = None;
        }
    }

    /// Cancel any running loop and refuse further `begin` calls.
    pub async fn dispose(&self) {
        self.cancel().await;

        let mut inner = self.inner.lock();
        inner.state = TaskState::Disposed;
        inner.action = None;
        tracing::debug!(task = %self.name, "Task controller disposed");
    }

    fn events_sender(&self) -> broadcast::Sender<TaskEvent> {
        self.events.clone()
    }
}

impl Drop for TaskController {
    fn drop(&mut self) {
        if let Some(token) = &self.inner.lock().token {
            token.cancel();
        }
    }
}

// =============================================================================
// Retry Task Controller
// =============================================================================

/// Re-runs a loop body until cancelled, pausing a fixed delay between runs.
///
/// Each run gets the same token; a run that ends (successfully or not) while
/// the token is live is followed by [`TaskEvent::Pausing`], the delay, and
/// [`TaskEvent::Resuming`]. Failures and panics are logged and published as
/// [`TaskEvent::Error`]; a [`Cancelled`] error while the token is live is
/// swallowed. The loop only exits through cancellation.
pub struct RetryTaskController {
    controller: TaskController,
    retry_delay: Arc<AtomicU64>,
}

impl fmt::Debug for RetryTaskController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTaskController")
            .field("name", &self.controller.name)
            .field("state", &self.state())
            .field("retry_delay", &self.retry_delay())
            .finish()
    }
}

impl RetryTaskController {
    /// Create an idle controller with the default retry delay.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            controller: TaskController::new(name),
            retry_delay: Arc::new(AtomicU64::new(duration_millis(DEFAULT_RETRY_DELAY))),
        }
    }

    /// Set the initial retry delay.
    #[must_use]
    pub fn with_retry_delay(self, delay: Duration) -> Self {
        self.set_retry_delay(delay);
        self
    }

    /// Current retry delay.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay.load(Ordering::Relaxed))
    }

    /// Change the retry delay; applies from the next pause.
    pub fn set_retry_delay(&self, delay: Duration) {
        self.retry_delay
            .store(duration_millis(delay), Ordering::Relaxed);
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        self.controller.name()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.controller.state()
    }

    /// Whether the retry loop is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.controller.is_active()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<TaskEvent> {
        self.controller.subscribe_events()
    }

    /// Start the retry loop around `action` (or the stored action).
    ///
    /// # Errors
    ///
    /// Same as [`TaskController::begin`].
    pub fn begin(&self, action: Option<TaskAction>) -> Result<(), TaskError> {
        let action = action.map(|action| {
            retrying(
                action,
                Arc::clone(&self.retry_delay),
                self.controller.events_sender(),
                Arc::clone(&self.controller.name),
            )
        });
        self.controller.begin(action)
    }

    /// Cancel the retry loop and wait for it to exit.
    pub async fn cancel(&self) {
        self.controller.cancel().await;
    }

    /// Cancel and refuse further `begin` calls.
    pub async fn dispose(&self) {
        self.controller.dispose().await;
    }
}

fn retrying(
    action: TaskAction,
    retry_delay: Arc<AtomicU64>,
    events: broadcast::Sender<TaskEvent>,
    name: Arc<str>,
) -> TaskAction {
    Arc::new(move |token: CancellationToken| {
        let action = Arc::clone(&action);
        let retry_delay = Arc::clone(&retry_delay);
        let events = events.clone();
        let name = Arc::clone(&name);

        async move {
            while !token.is_cancelled() {
                match run_guarded(&action, token.clone()).await {
                    Ok(()) => {}
                    Err(_) if token.is_cancelled() => break,
                    Err(error) if error.is::<Cancelled>() => {
                        tracing::debug!(task = %name, "Task run cancelled itself");
                    }
                    Err(error) => {
                        tracing::warn!(task = %name, error = %format!("{error:#}"), "Task run failed");
                        let _ = events.send(TaskEvent::Error(Arc::new(error)));
                    }
                }

                if token.is_cancelled() {
                    break;
                }

                let delay = Duration::from_millis(retry_delay.load(Ordering::Relaxed));
                metrics::record_retry_pause(&name);
                tracing::debug!(task = %name, delay_ms = delay.as_millis(), "Task pausing");
                let _ = events.send(TaskEvent::Pausing { delay });

                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                tracing::debug!(task = %name, "Task resuming");
                let _ = events.send(TaskEvent::Resuming);
            }
            Ok(())
        }
        .boxed()
    })
}

fn duration_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
