//! Single update function applied to the task state
//!
//! Every source (push, poll, simulated tick, manual override, cancel) is turned
//! into a [`ProgressUpdate`] and applied through [`apply`]. The function is pure
//! apart from the state it mutates, which keeps the invariants in one place:
//!
//! - progress is clamped to `0..=100`
//! - while running, progress never decreases
//! - `completed` forces progress to 100
//! - `failed` always carries a non-empty error
//! - every applied update appends exactly one history entry
//! - a terminal state accepts nothing further

use crate::types::{
    PollResult, ProgressChannel, PushEvent, TaskHistoryEntry, TaskProgressState, TaskStatus,
};

/// Error recorded when a source reports failure without a reason
pub const DEFAULT_FAILURE_MESSAGE: &str = "task failed without an error message";

/// Error recorded by a cancel without an explicit reason
pub const CANCELLED_MESSAGE: &str = "task cancelled";

/// One update from any source
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// Channel producing the update
    pub source: ProgressChannel,
    /// Reported status; `None` and `idle` mean running
    pub status: Option<TaskStatus>,
    /// Reported progress
    pub progress: Option<f64>,
    /// Reported message
    pub message: Option<String>,
    /// Reported error
    pub error: Option<String>,
}

impl ProgressUpdate {
    /// Update from a poll result
    pub fn from_poll(result: PollResult) -> Self {
        Self {
            source: ProgressChannel::Polling,
            status: Some(result.status),
            progress: result.progress,
            message: result.message,
            error: result.error,
        }
    }

    /// Update from a matching push event
    pub fn from_push(event: PushEvent) -> Self {
        Self {
            source: ProgressChannel::Websocket,
            status: Some(event.status),
            progress: event.progress,
            message: event.message,
            error: event.error,
        }
    }

    /// Synthetic progress estimate; never terminal
    pub fn simulated(progress: f64) -> Self {
        Self {
            source: ProgressChannel::Simulated,
            status: None,
            progress: Some(progress),
            message: None,
            error: None,
        }
    }

    /// Caller-driven override
    pub fn manual(progress: f64, status: TaskStatus, message: Option<String>) -> Self {
        Self {
            source: ProgressChannel::Manual,
            status: Some(status),
            progress: Some(progress),
            message,
            error: None,
        }
    }

    /// Cancellation: a manual transition to failed
    pub fn cancel(reason: Option<&str>) -> Self {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(CANCELLED_MESSAGE)
            .to_string();
        Self {
            source: ProgressChannel::Manual,
            status: Some(TaskStatus::Failed),
            progress: None,
            message: Some(reason.clone()),
            error: Some(reason),
        }
    }
}

/// Why an update was not applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No task identifier is active
    NotTracking,
    /// The task already completed or failed
    Terminal,
    /// The update belongs to a previous activation
    Stale,
}

/// Result of offering an update to the tracker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// State changed and one history entry was appended
    Applied {
        /// The update moved the task into completed or failed
        terminal: bool,
    },
    /// State unchanged
    Ignored(IgnoreReason),
}

impl UpdateOutcome {
    /// True when the update changed the state
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied { .. })
    }
}

/// Apply `update` to `state`
///
/// `entry_id` and `now_ms` identify and timestamp the history entry;
/// `max_history` bounds the history, evicting the oldest entries first.
pub fn apply(
    state: &mut TaskProgressState,
    update: ProgressUpdate,
    entry_id: String,
    now_ms: i64,
    max_history: usize,
) -> UpdateOutcome {
    if state.status.is_terminal() {
        return UpdateOutcome::Ignored(IgnoreReason::Terminal);
    }

    let status = match update.status {
        None | Some(TaskStatus::Idle) => TaskStatus::Running,
        Some(status) => status,
    };

    let reported = update
        .progress
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 100.0));

    state.progress = match status {
        TaskStatus::Completed => 100.0,
        TaskStatus::Failed => reported.unwrap_or(state.progress),
        TaskStatus::Running | TaskStatus::Idle => {
            reported.map_or(state.progress, |p| p.max(state.progress))
        }
    };

    state.error = if status == TaskStatus::Failed {
        let reason = update
            .error
            .filter(|e| !e.trim().is_empty())
            .or_else(|| update.message.clone().filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
        Some(reason)
    } else {
        None
    };

    if update.message.is_some() {
        state.message = update.message.clone();
    }
    state.status = status;
    state.channel = update.source;
    state.last_update = Some(now_ms);

    state.history.push_back(TaskHistoryEntry {
        id: entry_id,
        timestamp: now_ms,
        progress: state.progress.floor() as u8,
        source: update.source,
        message: update.message,
    });
    while state.history.len() > max_history.max(1) {
        state.history.pop_front();
    }

    UpdateOutcome::Applied {
        terminal: status.is_terminal(),
    }
}
