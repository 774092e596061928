//! Per-activation event loop
//!
//! One driver runs per activated task identifier. Each iteration waits on the
//! sources in a fixed priority order (cancellation, push, finished poll, poll
//! tick, simulated tick) and hands the winning update to the tracker, tagged
//! with the generation it was started for. The tracker drops updates from older
//! generations.
//!
//! A poll runs as its own branch, so push events and cancellation are still
//! handled while a slow poll is in flight.

use super::Inner;
use super::reducer::{ProgressUpdate, UpdateOutcome};
use super::simulated::next_simulated_progress;
use crate::config::TrackerConfig;
use crate::sources::TaskSources;
use crate::error::Result;
use crate::types::{PollResult, PushEvent, TaskId};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::sync::Weak;
use tokio::time::error::Elapsed;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Parameters for spawning a driver
pub(crate) struct DriverParams {
    /// Tracker state; the driver stops once the tracker is gone
    pub inner: Weak<Inner>,
    /// Generation this driver belongs to
    pub generation: u64,
    /// Tracked task
    pub task_id: TaskId,
    /// Timing configuration
    pub config: TrackerConfig,
    /// Poller, push stream, matcher
    pub sources: TaskSources,
    /// Cancelled on deactivation or manual terminal transition
    pub cancel: CancellationToken,
}

/// Next event from the push stream; pending forever without one
async fn next_push(push: &mut Option<BoxStream<'static, PushEvent>>) -> Option<PushEvent> {
    match push {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Poll started on a tick, bounded by the poll timeout
type InFlightPoll = BoxFuture<'static, std::result::Result<Result<Option<PollResult>>, Elapsed>>;

/// Result of the in-flight poll; pending forever when none is running
async fn finished_poll(
    in_flight: &mut Option<InFlightPoll>,
) -> std::result::Result<Result<Option<PollResult>>, Elapsed> {
    match in_flight {
        Some(poll) => poll.await,
        None => std::future::pending().await,
    }
}

/// Run until the task is terminal, the driver is cancelled, or the tracker is dropped
pub(crate) async fn run(params: DriverParams) {
    let DriverParams {
        inner,
        generation,
        task_id,
        config,
        sources,
        cancel,
    } = params;
    let TaskSources {
        poller,
        mut push,
        matcher,
    } = sources;

    let start = Instant::now();
    let mut last_signal = start;
    let poll_timeout = config.poll_timeout();

    let mut poll_ticker = interval_at(start + config.poll_interval, config.poll_interval);
    poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut simulated_ticker = interval_at(start + config.fallback_duration, config.simulated_tick);
    simulated_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<InFlightPoll> = None;

    tracing::debug!(
        task_id = %task_id,
        generation,
        poller = poller.is_some(),
        push = push.is_some(),
        "task driver started"
    );

    loop {
        let update = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            event = next_push(&mut push) => {
                let Some(event) = event else {
                    tracing::debug!(task_id = %task_id, "push stream closed");
                    push = None;
                    continue;
                };
                if !matcher.matches(&event, &task_id) {
                    tracing::trace!(
                        task_id = %task_id,
                        kind = %event.kind,
                        "ignoring push event for another task"
                    );
                    continue;
                }
                // A fresh push covers the next poll tick
                poll_ticker.reset();
                ProgressUpdate::from_push(event)
            }

            polled = finished_poll(&mut in_flight) => {
                in_flight = None;
                match polled {
                    Ok(Ok(Some(result))) => ProgressUpdate::from_poll(result),
                    Ok(Ok(None)) => {
                        tracing::trace!(task_id = %task_id, "poll returned no update");
                        continue;
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(
                            task_id = %task_id,
                            error = %e,
                            "poll failed, treating as no update"
                        );
                        continue;
                    }
                    Err(_) => {
                        tracing::debug!(
                            task_id = %task_id,
                            timeout_ms = poll_timeout.as_millis() as u64,
                            "poll timed out, treating as no update"
                        );
                        continue;
                    }
                }
            }

            _ = poll_ticker.tick(), if poller.is_some() && in_flight.is_none() => {
                let Some(poller) = poller.clone() else { continue };
                let id = task_id.clone();
                let poll = async move {
                    tokio::time::timeout(poll_timeout, poller.poll(&id)).await
                };
                in_flight = Some(poll.boxed());
                continue;
            }

            _ = simulated_ticker.tick() => {
                if last_signal.elapsed() < config.fallback_duration {
                    continue;
                }
                let Some(inner) = inner.upgrade() else { break };
                let Some(current) = inner.current_progress(generation) else { break };
                ProgressUpdate::simulated(next_simulated_progress(current))
            }
        };

        if update.source.is_live() {
            last_signal = Instant::now();
        }

        let Some(inner) = inner.upgrade() else { break };
        match inner.apply_update(generation, update) {
            UpdateOutcome::Applied { terminal: false } => {}
            UpdateOutcome::Applied { terminal: true } | UpdateOutcome::Ignored(_) => break,
        }
    }

    tracing::debug!(task_id = %task_id, generation, "task driver stopped");
}
