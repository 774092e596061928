//! # taskwatch
//!
//! Resilient HTTP requests and progress tracking for long-running server-side jobs.
//!
//! ## Design Philosophy
//!
//! taskwatch is designed to be:
//! - **Predictable** - Every request returns a uniform outcome, never a raised error
//! - **Resilient** - Per-attempt timeouts and linear backoff for transient failures
//! - **Source-agnostic** - Push, polling, simulated and manual progress feed one state
//! - **Event-driven** - Consumers subscribe to state changes instead of polling the tracker
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskwatch::{
//!     HttpPoller, JobLauncher, RequestClient, RequestOptions, RetryPolicy, TaskSources,
//!     TaskTracker, TrackerConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(RequestClient::with_base_url("http://localhost:8080/api/")?);
//!     let tracker = TaskTracker::new(TrackerConfig::default())?;
//!
//!     let poller = HttpPoller::new(client.clone(), "jobs/{task_id}/status")?;
//!     let launcher = JobLauncher::new(client, RetryPolicy::writes());
//!     let outcome = launcher
//!         .launch(
//!             "plugins/dedupe/run",
//!             &RequestOptions::post_json(serde_json::json!({})),
//!             &tracker,
//!             TaskSources::new().with_poller(poller),
//!         )
//!         .await;
//!     if let Some(error) = outcome.error() {
//!         eprintln!("could not start job: {error}");
//!         return Ok(());
//!     }
//!
//!     // Subscribe to state changes
//!     let mut updates = tracker.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let state = updates.borrow().clone();
//!         println!("{} {:.0}%", state.status, state.progress);
//!         if state.is_terminal() {
//!             break;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Resilient HTTP request client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Job start requests
pub mod launch;
/// Retry logic with linear backoff
pub mod retry;
/// Progress sources: pollers, push streams, event matchers
pub mod sources;
/// Task progress tracking
pub mod tracker;
/// Core types
pub mod types;

// Re-export commonly used types
pub use client::{RequestClient, RequestOptions, RequestOutcome, ResponseBody};
pub use config::{RetryPolicy, TrackerConfig};
pub use error::{Error, RequestError, Result};
pub use launch::JobLauncher;
pub use sources::{HttpPoller, MatchByField, MatchByTaskId, Poller, TaskSources, poll_fn};
pub use tracker::{IgnoreReason, TaskTracker, UpdateOutcome};
pub use types::{
    PollResult, ProgressChannel, PushEvent, TaskHistoryEntry, TaskId, TaskProgressState,
    TaskStatus,
};
