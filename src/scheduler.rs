//! Background rendering with at most one live render per source.
//!
//! Every [`RenderScheduler::submit`] replaces whatever render is registered for
//! the same key and marks the old one cancelled. Each task moves through
//! `Running -> Delivered | Cancelled` on an atomic state word, and the
//! `Running -> Delivered` transition is taken right before the sink is called,
//! so a task that lost to a newer submit can never reach its sink.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, trace, warn};

use crate::builder::{BuildOptions, DocumentBuilder};
use crate::document::Document;
use crate::error::{BuildError, SchedulerError};
use crate::model::{Article, SourceId};

const DEFAULT_THREAD_NAME: &str = "aard-render";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub thread_name: String,
    pub build: BuildOptions,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            build: BuildOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Delivered,
    Cancelled,
}

impl TaskState {
    const fn code(self) -> u8 {
        match self {
            TaskState::Running => 0,
            TaskState::Delivered => 1,
            TaskState::Cancelled => 2,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => TaskState::Running,
            1 => TaskState::Delivered,
            _ => TaskState::Cancelled,
        }
    }
}

pub struct RenderTask {
    id: u64,
    key: SourceId,
    state: AtomicU8,
}

impl RenderTask {
    fn new(id: u64, key: SourceId) -> Self {
        Self {
            id,
            key,
            state: AtomicU8::new(TaskState::Running.code()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &SourceId {
        &self.key
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_code(self.state.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    fn transition(&self, to: TaskState) -> bool {
        self.state
            .compare_exchange(
                TaskState::Running.code(),
                to.code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `false` when the task already delivered or was cancelled.
    fn cancel(&self) -> bool {
        self.transition(TaskState::Cancelled)
    }

    fn claim_delivery(&self) -> bool {
        self.transition(TaskState::Delivered)
    }
}

impl fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTask")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

/// Caller's view of a submitted render.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    task: Arc<RenderTask>,
    scheduler: Weak<SchedulerShared>,
}

impl RenderHandle {
    pub fn id(&self) -> u64 {
        self.task.id
    }

    pub fn key(&self) -> &SourceId {
        &self.task.key
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// Cancels this render if it has not been delivered yet.
    pub fn cancel(&self) -> bool {
        let cancelled = self.task.cancel();
        if let Some(shared) = self.scheduler.upgrade() {
            shared.release(&self.task);
        }
        cancelled
    }
}

/// What a sink receives: a document, or the reason the build failed.
#[derive(Debug)]
pub struct RenderOutcome {
    pub source: SourceId,
    pub title: String,
    pub task: u64,
    pub result: Result<Document, BuildError>,
}

/// Receives the finished render of one task, at most once.
///
/// Called from a worker thread; implementations should hand the outcome over
/// to the consumer's own thread or event loop rather than touch UI state.
pub trait RenderSink: Send + 'static {
    fn deliver(self, outcome: RenderOutcome);
}

impl<F> RenderSink for F
where
    F: FnOnce(RenderOutcome) + Send + 'static,
{
    fn deliver(self, outcome: RenderOutcome) {
        self(outcome)
    }
}

/// Forwards outcomes to a std channel drained by the consumer thread.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::Sender<RenderOutcome>);

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<RenderOutcome>) -> Self {
        Self(sender)
    }

    pub fn channel() -> (Self, mpsc::Receiver<RenderOutcome>) {
        let (sender, receiver) = mpsc::channel();
        (Self(sender), receiver)
    }
}

impl RenderSink for ChannelSink {
    fn deliver(self, outcome: RenderOutcome) {
        if self.0.send(outcome).is_err() {
            debug!("render consumer hung up");
        }
    }
}

/// Forwards outcomes into a tokio task's unbounded channel.
#[cfg(feature = "async")]
#[derive(Debug, Clone)]
pub struct AsyncChannelSink(tokio::sync::mpsc::UnboundedSender<RenderOutcome>);

#[cfg(feature = "async")]
impl AsyncChannelSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<RenderOutcome>) -> Self {
        Self(sender)
    }

    pub fn channel() -> (Self, tokio::sync::mpsc::UnboundedReceiver<RenderOutcome>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self(sender), receiver)
    }
}

#[cfg(feature = "async")]
impl RenderSink for AsyncChannelSink {
    fn deliver(self, outcome: RenderOutcome) {
        if self.0.send(outcome).is_err() {
            debug!("render consumer hung up");
        }
    }
}

#[derive(Clone)]
pub struct RenderScheduler {
    shared: Arc<SchedulerShared>,
}

struct SchedulerShared {
    active: Mutex<HashMap<SourceId, Arc<RenderTask>>>,
    pool: ThreadPool,
    builder: DocumentBuilder,
    next_id: AtomicU64,
}

impl RenderScheduler {
    pub fn new() -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let thread_name = config.thread_name;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(move |index| format!("{thread_name}-{index}"))
            .panic_handler(|payload| {
                error!(panic = %panic_message(&*payload), "render worker panicked");
            })
            .build()?;
        Ok(Self {
            shared: Arc::new(SchedulerShared {
                active: Mutex::new(HashMap::new()),
                pool,
                builder: DocumentBuilder::with_options(config.build),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Starts rendering `article` for `key`, superseding any render already
    /// registered for that key. The superseded render never reaches its sink.
    pub fn submit<S: RenderSink>(&self, key: SourceId, article: Article, sink: S) -> RenderHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(RenderTask::new(id, key.clone()));
        let superseded = {
            let mut active = self.shared.active.lock();
            active
                .insert(key.clone(), Arc::clone(&task))
                .filter(|previous| previous.cancel())
                .map(|previous| previous.id)
        };
        if let Some(previous) = superseded {
            debug!(source = %key, task = previous, by = id, "superseded in-flight render");
        }

        let shared = Arc::clone(&self.shared);
        let worker = Arc::clone(&task);
        self.shared.pool.spawn(move || {
            let builder = shared.builder.clone();
            let title = article.title.clone();
            shared.execute(&worker, title, move || builder.build_article(&article), sink);
        });
        RenderHandle {
            task,
            scheduler: Arc::downgrade(&self.shared),
        }
    }

    /// Cancels the render registered for `key`, if any.
    pub fn cancel(&self, key: &SourceId) -> bool {
        let removed = self.shared.active.lock().remove(key);
        let cancelled = removed.is_some_and(|task| task.cancel());
        if cancelled {
            debug!(source = %key, "render cancelled");
        }
        cancelled
    }

    /// Cancels every registered render, e.g. when the consuming view goes away.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.shared.active.lock().drain().map(|(_, task)| task).collect();
        let cancelled = drained.iter().filter(|task| task.cancel()).count();
        debug!(cancelled, "cancelled all renders");
        cancelled
    }

    pub fn is_active(&self, key: &SourceId) -> bool {
        self.shared.active.lock().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.shared.active.lock().len()
    }
}

impl fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("active", &self.active_count())
            .field("workers", &self.shared.pool.current_num_threads())
            .finish()
    }
}

impl SchedulerShared {
    fn execute<S, F>(&self, task: &RenderTask, title: String, build: F, sink: S)
    where
        S: RenderSink,
        F: FnOnce() -> Result<Document, BuildError>,
    {
        let _release = Release { shared: self, task };
        if task.is_cancelled() {
            trace!(source = %task.key, task = task.id, "render cancelled before start");
            return;
        }
        let result = panic::catch_unwind(AssertUnwindSafe(build)).unwrap_or_else(|payload| {
            let message = panic_message(&*payload);
            error!(source = %task.key, task = task.id, panic = %message, "render build panicked");
            Err(BuildError::Panicked { message })
        });
        if let Err(err) = &result {
            warn!(source = %task.key, title = %title, error = %err, "article build failed");
        }
        if !task.claim_delivery() {
            trace!(source = %task.key, task = task.id, "render cancelled before delivery");
            return;
        }
        let outcome = RenderOutcome {
            source: task.key.clone(),
            title,
            task: task.id,
            result,
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(outcome))) {
            error!(
                source = %task.key,
                task = task.id,
                panic = %panic_message(&*payload),
                "render sink panicked"
            );
        }
    }

    fn release(&self, task: &RenderTask) {
        let mut active = self.active.lock();
        if active
            .get(&task.key)
            .is_some_and(|current| current.id == task.id)
        {
            active.remove(&task.key);
        }
    }
}

/// Deregisters a task however its run ends, unwinding included.
struct Release<'a> {
    shared: &'a SchedulerShared,
    task: &'a RenderTask,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.shared.release(self.task);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
