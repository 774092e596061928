//! Custom test assertions for integration tests

use std::time::Duration;
use taskwatch::{ProgressChannel, TaskProgressState, TaskStatus, TaskTracker};

/// Result of waiting for a task to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Task completed
    Completed(TaskProgressState),
    /// Task failed with error
    Failed(String),
    /// Timeout waiting for a terminal state
    Timeout(TaskProgressState),
    /// Tracker dropped its state channel
    ChannelClosed,
}

/// Wait for the tracked task to reach a terminal state
///
/// # Arguments
/// * `tracker` - The tracker following the task
/// * `timeout` - Maximum time to wait
pub async fn wait_for_terminal(tracker: &TaskTracker, timeout: Duration) -> WaitResult {
    let mut updates = tracker.subscribe();

    let result = tokio::time::timeout(timeout, async {
        loop {
            let state = updates.borrow_and_update().clone();
            match state.status {
                TaskStatus::Completed => return WaitResult::Completed(state),
                TaskStatus::Failed => {
                    return WaitResult::Failed(state.error.unwrap_or_default());
                }
                _ => {}
            }
            if updates.changed().await.is_err() {
                return WaitResult::ChannelClosed;
            }
        }
    })
    .await;

    match result {
        Ok(result) => result,
        Err(_) => WaitResult::Timeout(tracker.snapshot()),
    }
}

/// Wait until the tracker reports `channel`
pub async fn wait_for_channel(
    tracker: &TaskTracker,
    channel: ProgressChannel,
    timeout: Duration,
) -> Option<TaskProgressState> {
    let mut updates = tracker.subscribe();
    tokio::time::timeout(timeout, async {
        loop {
            let state = updates.borrow_and_update().clone();
            if state.channel == channel {
                return Some(state);
            }
            if updates.changed().await.is_err() {
                return None;
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Assert that history timestamps and progress never go backwards
pub fn assert_history_ordered(state: &TaskProgressState) {
    for pair in state.history.iter().collect::<Vec<_>>().windows(2) {
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "history timestamps out of order: {:?}",
            state.history
        );
        assert!(
            pair[0].progress <= pair[1].progress,
            "history progress decreased: {:?}",
            state.history
        );
    }
}
