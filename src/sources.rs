//! Progress sources consumed by the tracker
//!
//! A tracker can be fed by a [`Poller`] (pull), a push event stream, or both.
//! Neither is owned by the tracker: the poller is called on an interval and the
//! push stream is only read, never opened or closed.

use crate::client::{RequestClient, RequestOptions, ResponseBody};
use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::types::{PollResult, PushEvent, TaskId};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Placeholder replaced by the task identifier in [`HttpPoller`] endpoints
pub const TASK_ID_PLACEHOLDER: &str = "{task_id}";

/// Pull-based progress source
///
/// `Ok(None)` and `Err(_)` both mean "no update this tick"; neither marks the
/// task as failed.
#[async_trait]
pub trait Poller: Send + Sync {
    /// Fetch the current status of `task_id`
    async fn poll(&self, task_id: &TaskId) -> Result<Option<PollResult>>;
}

/// [`Poller`] backed by an async closure, see [`poll_fn`]
pub struct PollFn<F>(F);

/// Build a poller from an async closure taking the task identifier
///
/// ```no_run
/// use taskwatch::sources::poll_fn;
/// use taskwatch::types::PollResult;
///
/// let poller = poll_fn(|task_id| async move {
///     let _ = task_id;
///     Ok(Some(PollResult::running(50.0)))
/// });
/// ```
pub fn poll_fn<F, Fut>(f: F) -> PollFn<F>
where
    F: Fn(TaskId) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<PollResult>>> + Send + 'static,
{
    PollFn(f)
}

#[async_trait]
impl<F, Fut> Poller for PollFn<F>
where
    F: Fn(TaskId) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<PollResult>>> + Send + 'static,
{
    async fn poll(&self, task_id: &TaskId) -> Result<Option<PollResult>> {
        (self.0)(task_id.clone()).await
    }
}

/// Poller that GETs a status endpoint through a [`RequestClient`]
///
/// The endpoint template contains [`TASK_ID_PLACEHOLDER`], replaced with the
/// percent-encoded task identifier. A `null` JSON body or an empty text body
/// means "no update".
#[derive(Clone, Debug)]
pub struct HttpPoller {
    client: Arc<RequestClient>,
    endpoint_template: String,
    policy: RetryPolicy,
}

impl HttpPoller {
    /// Create a poller for `endpoint_template` using [`RetryPolicy::polling`]
    pub fn new(client: Arc<RequestClient>, endpoint_template: impl Into<String>) -> Result<Self> {
        let endpoint_template = endpoint_template.into();
        if !endpoint_template.contains(TASK_ID_PLACEHOLDER) {
            return Err(Error::config(
                "endpoint_template",
                format!("must contain {TASK_ID_PLACEHOLDER}"),
            ));
        }
        Ok(Self {
            client,
            endpoint_template,
            policy: RetryPolicy::polling(),
        })
    }

    /// Override the retry policy used for each poll
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Endpoint for a specific task
    pub fn endpoint_for(&self, task_id: &TaskId) -> String {
        // form encoding turns spaces into '+'; a literal '+' is already %2B
        let encoded: String = url::form_urlencoded::byte_serialize(task_id.as_str().as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        self.endpoint_template.replace(TASK_ID_PLACEHOLDER, &encoded)
    }
}

#[async_trait]
impl Poller for HttpPoller {
    async fn poll(&self, task_id: &TaskId) -> Result<Option<PollResult>> {
        let endpoint = self.endpoint_for(task_id);
        let body = self
            .client
            .request(&endpoint, &RequestOptions::get(), &self.policy)
            .await
            .into_result()
            .map_err(Error::Poll)?;

        match body {
            ResponseBody::Json(serde_json::Value::Null) => Ok(None),
            ResponseBody::Text(text) if text.trim().is_empty() => Ok(None),
            body => body.decode().map(Some).map_err(Error::from),
        }
    }
}

/// Decides whether a push event belongs to the tracked task
pub trait EventMatcher: Send + Sync {
    /// True when `event` is about `active`
    fn matches(&self, event: &PushEvent, active: &TaskId) -> bool;
}

impl<F> EventMatcher for F
where
    F: Fn(&PushEvent, &TaskId) -> bool + Send + Sync,
{
    fn matches(&self, event: &PushEvent, active: &TaskId) -> bool {
        self(event, active)
    }
}

/// Default matcher: the event's `task_id` equals the active identifier
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchByTaskId;

impl EventMatcher for MatchByTaskId {
    fn matches(&self, event: &PushEvent, active: &TaskId) -> bool {
        event.task_id.as_deref() == Some(active.as_str())
    }
}

/// Matcher on a service-specific identifier field (e.g. `plugin_run_id`)
#[derive(Clone, Debug)]
pub struct MatchByField(pub String);

impl EventMatcher for MatchByField {
    fn matches(&self, event: &PushEvent, active: &TaskId) -> bool {
        match event.extra.get(&self.0) {
            Some(serde_json::Value::String(s)) => s == active.as_str(),
            Some(serde_json::Value::Number(n)) => n.to_string() == active.as_str(),
            _ => false,
        }
    }
}

/// Sources handed to the tracker on activation
pub struct TaskSources {
    pub(crate) poller: Option<Arc<dyn Poller>>,
    pub(crate) push: Option<BoxStream<'static, PushEvent>>,
    pub(crate) matcher: Arc<dyn EventMatcher>,
}

impl Default for TaskSources {
    fn default() -> Self {
        Self {
            poller: None,
            push: None,
            matcher: Arc::new(MatchByTaskId),
        }
    }
}

impl std::fmt::Debug for TaskSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSources")
            .field("poller", &self.poller.is_some())
            .field("push", &self.push.is_some())
            .finish()
    }
}

impl TaskSources {
    /// No sources: only simulated progress and manual overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll with `poller` on the configured interval
    #[must_use]
    pub fn with_poller(mut self, poller: impl Poller + 'static) -> Self {
        self.poller = Some(Arc::new(poller));
        self
    }

    /// Poll with a shared poller
    #[must_use]
    pub fn with_shared_poller(mut self, poller: Arc<dyn Poller>) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Read push events from a stream
    #[must_use]
    pub fn with_push_stream(
        mut self,
        stream: impl futures::Stream<Item = PushEvent> + Send + 'static,
    ) -> Self {
        self.push = Some(stream.boxed());
        self
    }

    /// Read push events from a broadcast bus; lagged events are skipped
    #[must_use]
    pub fn with_push_bus(self, receiver: broadcast::Receiver<PushEvent>) -> Self {
        let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "push bus lagged, events dropped");
                    None
                }
            }
        });
        self.with_push_stream(stream)
    }

    /// Replace the default [`MatchByTaskId`] matcher
    #[must_use]
    pub fn with_matcher(mut self, matcher: impl EventMatcher + 'static) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// True when a poller is configured
    pub fn has_poller(&self) -> bool {
        self.poller.is_some()
    }

    /// True when a push stream is configured
    pub fn has_push(&self) -> bool {
        self.push.is_some()
    }
}
