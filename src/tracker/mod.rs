//! Task progress tracking
//!
//! A [`TaskTracker`] follows one server-side job at a time and exposes a single
//! [`TaskProgressState`] regardless of which source is feeding it:
//!
//! 1. **Push**: events from a bus that match the active task win first.
//! 2. **Polling**: a [`Poller`](crate::sources::Poller) called every `poll_interval`.
//! 3. **Simulated**: after `fallback_duration` without a real signal, a synthetic
//!    estimate keeps the UI moving without ever reaching 100.
//! 4. **Manual**: [`set_manual_progress`](TaskTracker::set_manual_progress) and
//!    [`cancel`](TaskTracker::cancel) take effect immediately.
//!
//! All sources go through one reducer under one lock. Every activation bumps a
//! generation counter; updates tagged with an older generation are dropped, so a
//! late callback for a previous task can never touch the current one.
//!
//! # Example
//!
//! ```no_run
//! use taskwatch::config::TrackerConfig;
//! use taskwatch::sources::{TaskSources, poll_fn};
//! use taskwatch::tracker::TaskTracker;
//! use taskwatch::types::PollResult;
//!
//! # async fn example() -> taskwatch::Result<()> {
//! let tracker = TaskTracker::new(TrackerConfig::default())?;
//! let poller = poll_fn(|_task_id| async { Ok(Some(PollResult::running(25.0))) });
//! tracker.activate("job-1", TaskSources::new().with_poller(poller))?;
//!
//! let mut updates = tracker.subscribe();
//! while updates.changed().await.is_ok() {
//!     let state = updates.borrow().clone();
//!     println!("{} {:.0}% via {:?}", state.status, state.progress, state.channel);
//!     if state.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod driver;
pub mod reducer;
pub mod simulated;


pub use reducer::{IgnoreReason, ProgressUpdate, UpdateOutcome};

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::sources::TaskSources;
use crate::types::{TaskId, TaskProgressState, TaskStatus};
use driver::DriverParams;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared between the tracker handle and its driver
pub(crate) struct Inner {
    config: TrackerConfig,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<TaskProgressState>,
    /// Revision of the state last sent on `state_tx`
    published: AtomicU64,
}

struct Shared {
    /// Incremented on every activation and deactivation
    generation: u64,
    task_id: Option<TaskId>,
    state: TaskProgressState,
    /// Sequence for history entry ids within a generation
    next_entry: u64,
    cancel: Option<CancellationToken>,
    driver: Option<JoinHandle<()>>,
    /// Incremented on every state change, orders publishes
    revision: u64,
}

/// State copy taken under the lock, published after it is released
struct Published {
    revision: u64,
    state: TaskProgressState,
}

impl Shared {
    fn apply(&mut self, update: ProgressUpdate, max_history: usize) -> UpdateOutcome {
        let Some(task_id) = &self.task_id else {
            return UpdateOutcome::Ignored(IgnoreReason::NotTracking);
        };
        let entry_id = format!("{}-{}-{}", task_id, self.generation, self.next_entry);
        let outcome = reducer::apply(
            &mut self.state,
            update,
            entry_id,
            chrono::Utc::now().timestamp_millis(),
            max_history,
        );
        if outcome.is_applied() {
            self.next_entry += 1;
        }
        outcome
    }

    fn stamp(&mut self) -> Published {
        self.revision += 1;
        Published {
            revision: self.revision,
            state: self.state.clone(),
        }
    }

    /// Stop the driver synchronously; pending timers and subscriptions go with it
    fn stop_driver(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a state to subscribers; must be called without the state lock held
    ///
    /// A copy older than the last one sent is dropped, so racing publishers
    /// cannot move subscribers backwards.
    fn publish(&self, update: Published) {
        let Published { revision, state } = update;
        self.state_tx.send_if_modified(|current| {
            if revision <= self.published.load(Ordering::Acquire) {
                return false;
            }
            self.published.store(revision, Ordering::Release);
            *current = state;
            true
        });
    }

    /// Apply an update produced by the driver of `generation`
    pub(crate) fn apply_update(&self, generation: u64, update: ProgressUpdate) -> UpdateOutcome {
        let mut shared = self.lock();
        if shared.generation != generation {
            tracing::debug!(
                generation,
                current = shared.generation,
                source = ?update.source,
                "dropping update from previous activation"
            );
            return UpdateOutcome::Ignored(IgnoreReason::Stale);
        }

        let outcome = shared.apply(update, self.config.max_history);
        let UpdateOutcome::Applied { terminal } = outcome else {
            return outcome;
        };
        if terminal {
            tracing::info!(
                task_id = ?shared.task_id,
                status = %shared.state.status,
                channel = ?shared.state.channel,
                error = ?shared.state.error,
                "task reached terminal state"
            );
        }
        let published = shared.stamp();
        drop(shared);
        self.publish(published);
        outcome
    }

    /// Current progress, if `generation` is still the active one
    pub(crate) fn current_progress(&self, generation: u64) -> Option<f64> {
        let shared = self.lock();
        (shared.generation == generation).then_some(shared.state.progress)
    }
}

/// Tracks the progress of one server-side job at a time
///
/// The state is owned by the tracker; consumers read it through
/// [`snapshot`](Self::snapshot) or [`subscribe`](Self::subscribe) and change it
/// only through the manual operations. Dropping the tracker stops tracking.
pub struct TaskTracker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.lock();
        f.debug_struct("TaskTracker")
            .field("task_id", &shared.task_id)
            .field("generation", &shared.generation)
            .field("status", &shared.state.status)
            .finish()
    }
}

impl TaskTracker {
    /// Create an idle tracker
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let (state_tx, _rx) = watch::channel(TaskProgressState::default());
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                shared: Mutex::new(Shared {
                    generation: 0,
                    task_id: None,
                    state: TaskProgressState::default(),
                    next_entry: 0,
                    cancel: None,
                    driver: None,
                    revision: 0,
                }),
                state_tx,
                published: AtomicU64::new(0),
            }),
        })
    }

    /// Tracker configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Start tracking `task_id`, replacing any task tracked so far
    ///
    /// The previous task's driver is stopped before this returns and its state is
    /// discarded. The new state starts as connecting. Must be called from within
    /// a tokio runtime.
    pub fn activate(&self, task_id: impl Into<TaskId>, sources: TaskSources) -> Result<()> {
        let task_id = task_id.into();
        if task_id.is_blank() {
            return Err(Error::InvalidTaskId(task_id.to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let mut shared = self.inner.lock();
        shared.stop_driver();
        shared.generation += 1;
        shared.task_id = Some(task_id.clone());
        shared.state = TaskProgressState::connecting();
        shared.next_entry = 0;

        let generation = shared.generation;
        let cancel = CancellationToken::new();
        tracing::info!(
            task_id = %task_id,
            generation,
            poller = sources.has_poller(),
            push = sources.has_push(),
            "tracking task"
        );

        let driver = runtime.spawn(driver::run(DriverParams {
            inner: Arc::downgrade(&self.inner),
            generation,
            task_id,
            config: self.inner.config.clone(),
            sources,
            cancel: cancel.clone(),
        }));
        shared.cancel = Some(cancel);
        shared.driver = Some(driver);
        let published = shared.stamp();
        drop(shared);
        self.inner.publish(published);
        Ok(())
    }

    /// Stop tracking and discard the state
    pub fn deactivate(&self) {
        let mut shared = self.inner.lock();
        if shared.task_id.is_none() && shared.driver.is_none() {
            return;
        }
        shared.stop_driver();
        shared.generation += 1;
        if let Some(task_id) = shared.task_id.take() {
            tracing::info!(task_id = %task_id, "stopped tracking task");
        }
        shared.state = TaskProgressState::default();
        shared.next_entry = 0;
        let published = shared.stamp();
        drop(shared);
        self.inner.publish(published);
    }

    /// Override progress and status from the caller
    ///
    /// Takes effect immediately with channel `manual`. A terminal `status` ends
    /// tracking for the current task identifier.
    pub fn set_manual_progress(
        &self,
        progress: f64,
        status: TaskStatus,
        message: Option<String>,
    ) -> UpdateOutcome {
        self.apply_manual(ProgressUpdate::manual(progress, status, message))
    }

    /// Cancel the tracked task
    ///
    /// Equivalent to a manual transition to `failed` with `reason` (or a generic
    /// cancellation message). Cancelling a task that is already terminal, or when
    /// nothing is tracked, changes nothing.
    pub fn cancel(&self, reason: Option<&str>) -> UpdateOutcome {
        self.apply_manual(ProgressUpdate::cancel(reason))
    }

    fn apply_manual(&self, update: ProgressUpdate) -> UpdateOutcome {
        let mut shared = self.inner.lock();
        let outcome = shared.apply(update, self.inner.config.max_history);
        let terminal = match outcome {
            UpdateOutcome::Applied { terminal } => terminal,
            UpdateOutcome::Ignored(reason) => {
                tracing::debug!(?reason, "manual update ignored");
                return outcome;
            }
        };
        if terminal {
            shared.stop_driver();
            tracing::info!(
                task_id = ?shared.task_id,
                status = %shared.state.status,
                "task ended by manual override"
            );
        }
        let published = shared.stamp();
        drop(shared);
        self.inner.publish(published);
        outcome
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> TaskProgressState {
        self.inner.lock().state.clone()
    }

    /// Receiver that observes every published state
    pub fn subscribe(&self) -> watch::Receiver<TaskProgressState> {
        self.inner.state_tx.subscribe()
    }

    /// Task identifier currently tracked
    pub fn active_task(&self) -> Option<TaskId> {
        self.inner.lock().task_id.clone()
    }

    /// Current activation generation
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }
}

impl Drop for TaskTracker {
    fn drop(&mut self) {
        self.inner.lock().stop_driver();
    }
}
