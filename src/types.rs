//! Core types for taskwatch

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Identifier of a server-side job
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TaskId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task status
///
/// Services disagree on vocabulary, so parsing is case-insensitive and accepts
/// common synonyms (`pending`, `success`, `cancelled`, ...). Serialization
/// always uses the canonical lower-case name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TaskStatus {
    /// No task, or task known but no signal received yet
    #[default]
    Idle,
    /// Job in progress
    Running,
    /// Job finished successfully
    Completed,
    /// Job failed or was cancelled
    Failed,
}

impl TaskStatus {
    /// Completed and failed end tracking for a task identifier
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Canonical lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(TaskStatus::Idle),
            "running" | "pending" | "queued" | "in_progress" | "processing" | "started" => {
                Ok(TaskStatus::Running)
            }
            "completed" | "complete" | "success" | "succeeded" | "done" | "finished" => {
                Ok(TaskStatus::Completed)
            }
            "failed" | "error" | "errored" | "cancelled" | "canceled" | "aborted" => {
                Ok(TaskStatus::Failed)
            }
            other => Err(format!("unknown task status: {other:?}")),
        }
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Source currently driving progress for a task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressChannel {
    /// Live push events
    Websocket,
    /// Periodic poll calls
    Polling,
    /// Synthetic estimate while no real signal arrives
    Simulated,
    /// Caller-driven override
    Manual,
    /// Initial state, no source has produced anything yet
    #[default]
    Connecting,
}

impl ProgressChannel {
    /// True for channels backed by a real signal from the job
    pub fn is_live(&self) -> bool {
        matches!(self, ProgressChannel::Websocket | ProgressChannel::Polling)
    }
}

/// One applied update, kept for audit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    /// Unique per entry
    pub id: String,
    /// Epoch milliseconds at application time
    pub timestamp: i64,
    /// Progress after the update, 0..=100
    pub progress: u8,
    /// Channel that produced the update
    pub source: ProgressChannel,
    /// Message attached to the update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Progress state of the tracked task, as exposed to consumers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskProgressState {
    /// Lifecycle status
    pub status: TaskStatus,
    /// Progress percentage, 0.0..=100.0
    pub progress: f64,
    /// Channel that produced the latest update
    pub channel: ProgressChannel,
    /// Latest human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure reason, present only when `status == failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds of the last mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,
    /// Applied updates in application order, oldest first
    pub history: VecDeque<TaskHistoryEntry>,
}

impl TaskProgressState {
    /// State of a tracker that has just been handed a task identifier
    pub fn connecting() -> Self {
        Self {
            channel: ProgressChannel::Connecting,
            ..Default::default()
        }
    }

    /// True between activation and the first applied update
    pub fn is_connecting(&self) -> bool {
        self.status == TaskStatus::Idle && self.channel == ProgressChannel::Connecting
    }

    /// True once completed or failed
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Most recently applied history entry
    pub fn latest_entry(&self) -> Option<&TaskHistoryEntry> {
        self.history.back()
    }
}

/// Result of one poll call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    /// Reported status
    pub status: TaskStatus,
    /// Reported progress percentage
    #[serde(default, alias = "percent", skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Reported message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Reported error (meaningful with `failed`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollResult {
    /// Poll result with a status and nothing else
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status,
            progress: None,
            message: None,
            error: None,
        }
    }

    /// Running at the given progress
    pub fn running(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::status(TaskStatus::Running)
        }
    }

    /// Attach a message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach an error
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Event delivered by an external push bus
///
/// The identifier field varies between services; `task_id`, `job_id` and
/// `run_id` are recognized directly and anything else ends up in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Event type (e.g. "plugin_progress")
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Identifier of the job the event belongs to
    #[serde(
        default,
        alias = "job_id",
        alias = "run_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_id: Option<String>,
    /// Reported status
    pub status: TaskStatus,
    /// Reported progress percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Reported message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Reported error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Every other field of the event
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PushEvent {
    /// Event for `task_id` with the given status
    pub fn new(kind: impl Into<String>, task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            kind: kind.into(),
            task_id: Some(task_id.into()),
            status,
            progress: None,
            message: None,
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a progress value
    #[must_use]
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Attach a message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parses_synonyms_case_insensitively() {
        for (raw, expected) in [
            ("running", TaskStatus::Running),
            ("PENDING", TaskStatus::Running),
            ("in_progress", TaskStatus::Running),
            ("Completed", TaskStatus::Completed),
            ("success", TaskStatus::Completed),
            ("done", TaskStatus::Completed),
            ("failed", TaskStatus::Failed),
            ("cancelled", TaskStatus::Failed),
            ("Canceled", TaskStatus::Failed),
            (" idle ", TaskStatus::Idle),
        ] {
            assert_eq!(raw.parse::<TaskStatus>().unwrap(), expected, "{raw}");
        }
        assert!("exploded".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn status_serializes_canonically() {
        let status: TaskStatus = serde_json::from_value(json!("SUCCEEDED")).unwrap();
        assert_eq!(serde_json::to_value(status).unwrap(), json!("completed"));
        assert!(serde_json::from_value::<TaskStatus>(json!("weird")).is_err());
    }

    #[test]
    fn channel_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ProgressChannel::Websocket).unwrap(),
            json!("websocket")
        );
        assert!(ProgressChannel::Polling.is_live());
        assert!(!ProgressChannel::Simulated.is_live());
    }

    #[test]
    fn connecting_state_shape() {
        let state = TaskProgressState::connecting();
        assert!(state.is_connecting());
        assert!(!state.is_terminal());
        assert_eq!(state.progress, 0.0);
        assert!(state.history.is_empty());
        assert!(state.latest_entry().is_none());
    }

    #[test]
    fn poll_result_accepts_percent_alias() {
        let result: PollResult =
            serde_json::from_value(json!({"status": "processing", "percent": 55.5})).unwrap();
        assert_eq!(result.status, TaskStatus::Running);
        assert_eq!(result.progress, Some(55.5));
        assert!(result.message.is_none());
    }

    #[test]
    fn poll_result_requires_status() {
        assert!(serde_json::from_value::<PollResult>(json!({"progress": 10})).is_err());
    }

    #[test]
    fn push_event_collects_unknown_fields() {
        let event: PushEvent = serde_json::from_value(json!({
            "type": "plugin_progress",
            "job_id": "job-9",
            "status": "running",
            "progress": 12,
            "plugin_run_id": "run-3"
        }))
        .unwrap();
        assert_eq!(event.kind, "plugin_progress");
        assert_eq!(event.task_id.as_deref(), Some("job-9"));
        assert_eq!(event.progress, Some(12.0));
        assert_eq!(event.extra["plugin_run_id"], json!("run-3"));
    }

    #[test]
    fn task_id_helpers() {
        let id = TaskId::from("job-1");
        assert_eq!(id, "job-1");
        assert_eq!(id.to_string(), "job-1");
        assert!(!id.is_blank());
        assert!(TaskId::new("  ").is_blank());
    }
}
