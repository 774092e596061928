//! Start a server-side job and hand its identifier to a tracker

use crate::client::{RequestClient, RequestOptions, RequestOutcome, ResponseBody};
use crate::config::RetryPolicy;
use crate::sources::TaskSources;
use crate::tracker::TaskTracker;
use crate::types::TaskId;
use std::sync::Arc;

/// Fields that carry the job identifier in a start response, in lookup order
pub const TASK_ID_FIELDS: [&str; 4] = ["job_id", "task_id", "run_id", "id"];

/// Issues start requests and activates a tracker with the returned identifier
#[derive(Clone, Debug)]
pub struct JobLauncher {
    client: Arc<RequestClient>,
    policy: RetryPolicy,
}

impl JobLauncher {
    /// Launcher sending start requests through `client` under `policy`
    pub fn new(client: Arc<RequestClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Client used for start requests
    pub fn client(&self) -> &Arc<RequestClient> {
        &self.client
    }

    /// Retry policy applied to start requests
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Start a job and track it
    ///
    /// On success the tracker follows the new job with `sources` and the
    /// identifier is returned. A failed request, a response without an
    /// identifier or a failed activation leaves the tracker untouched.
    pub async fn launch(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        tracker: &TaskTracker,
        sources: TaskSources,
    ) -> RequestOutcome<TaskId> {
        let task_id = match self.client.request(endpoint, options, &self.policy).await {
            RequestOutcome::Success(body) => match task_id_from_body(&body) {
                Some(task_id) => task_id,
                None => {
                    tracing::warn!(endpoint, "start response carries no job identifier");
                    return RequestOutcome::Failure(format!(
                        "start response carries no job identifier (expected one of {})",
                        TASK_ID_FIELDS.join(", ")
                    ));
                }
            },
            RequestOutcome::Failure(e) => return RequestOutcome::Failure(e),
        };

        if let Err(e) = tracker.activate(task_id.clone(), sources) {
            tracing::warn!(endpoint, task_id = %task_id, error = %e, "failed to track started job");
            return RequestOutcome::Failure(e.to_string());
        }

        tracing::info!(endpoint, task_id = %task_id, "job started");
        RequestOutcome::Success(task_id)
    }
}

/// Identifier from a start response body
///
/// JSON bodies are searched for [`TASK_ID_FIELDS`] at the top level, then
/// inside a `data` object. A text body consisting of a single token is taken
/// as the identifier itself.
pub fn task_id_from_body(body: &ResponseBody) -> Option<TaskId> {
    match body {
        ResponseBody::Json(value) => {
            task_id_from_json(value).or_else(|| value.get("data").and_then(task_id_from_json))
        }
        ResponseBody::Text(text) => {
            let text = text.trim();
            (!text.is_empty() && !text.contains(char::is_whitespace))
                .then(|| TaskId::from(text))
        }
    }
}

fn task_id_from_json(value: &serde_json::Value) -> Option<TaskId> {
    let object = value.as_object()?;
    TASK_ID_FIELDS
        .iter()
        .filter_map(|field| object.get(*field))
        .find_map(|id| match id {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(TaskId::from(s.as_str())),
            serde_json::Value::Number(n) => Some(TaskId::new(n.to_string())),
            _ => None,
        })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn launcher(server: &MockServer) -> JobLauncher {
        let client = RequestClient::with_base_url(&server.uri()).unwrap();
        JobLauncher::new(
            Arc::new(client),
            RetryPolicy::new(Duration::from_secs(5), 1, Duration::from_millis(10)),
        )
    }

    #[test]
    fn id_fields_are_checked_in_order() {
        let body = ResponseBody::Json(json!({"id": "outer", "run_id": "run-1"}));
        assert_eq!(task_id_from_body(&body), Some(TaskId::from("run-1")));
    }

    #[test]
    fn numeric_and_nested_ids() {
        let numeric = ResponseBody::Json(json!({"job_id": 4521}));
        assert_eq!(task_id_from_body(&numeric), Some(TaskId::from("4521")));

        let nested = ResponseBody::Json(json!({"success": true, "data": {"task_id": "t-9"}}));
        assert_eq!(task_id_from_body(&nested), Some(TaskId::from("t-9")));
    }

    #[test]
    fn missing_or_blank_ids() {
        assert_eq!(task_id_from_body(&ResponseBody::Json(json!({"ok": true}))), None);
        assert_eq!(task_id_from_body(&ResponseBody::Json(json!({"job_id": " "}))), None);
        assert_eq!(task_id_from_body(&ResponseBody::Json(json!([1, 2]))), None);
        assert_eq!(
            task_id_from_body(&ResponseBody::Text("queued for later".to_string())),
            None
        );
    }

    #[test]
    fn plain_text_id() {
        let body = ResponseBody::Text("job-77\n".to_string());
        assert_eq!(task_id_from_body(&body), Some(TaskId::from("job-77")));
    }

    #[tokio::test]
    async fn launch_activates_tracker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/plugins/dedupe/run"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"run_id": "run-42"})))
            .expect(1)
            .mount(&server)
            .await;

        let tracker = TaskTracker::new(TrackerConfig::default()).unwrap();
        let outcome = launcher(&server)
            .launch(
                "plugins/dedupe/run",
                &RequestOptions::post_json(json!({"dry_run": false})),
                &tracker,
                TaskSources::new(),
            )
            .await;

        assert_eq!(outcome, RequestOutcome::Success(TaskId::from("run-42")));
        assert_eq!(tracker.active_task(), Some(TaskId::from("run-42")));
        assert!(tracker.snapshot().is_connecting());
    }

    #[tokio::test]
    async fn response_without_id_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
            .mount(&server)
            .await;

        let tracker = TaskTracker::new(TrackerConfig::default()).unwrap();
        let outcome = launcher(&server)
            .launch(
                "jobs",
                &RequestOptions::post_json(json!({})),
                &tracker,
                TaskSources::new(),
            )
            .await;

        assert!(outcome.error().unwrap().contains("no job identifier"));
        assert_eq!(tracker.active_task(), None);
    }

    #[tokio::test]
    async fn rejected_start_is_not_tracked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already running"))
            .expect(1)
            .mount(&server)
            .await;

        let tracker = TaskTracker::new(TrackerConfig::default()).unwrap();
        let outcome = launcher(&server)
            .launch(
                "jobs",
                &RequestOptions::post_json(json!({})),
                &tracker,
                TaskSources::new(),
            )
            .await;

        assert_eq!(outcome.error(), Some("HTTP 409 Conflict: already running"));
        assert_eq!(tracker.active_task(), None);
    }
}
