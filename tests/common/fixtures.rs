//! Mock job API fixtures

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskwatch::{RequestClient, RetryPolicy, TrackerConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Status endpoint template for the mock job API
pub const STATUS_TEMPLATE: &str = "jobs/{task_id}/status";

/// Tracker timings short enough for real-time tests
pub fn fast_tracker_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_millis(50),
        poll_timeout: Some(Duration::from_millis(500)),
        fallback_duration: Duration::from_millis(400),
        simulated_tick: Duration::from_millis(50),
        max_history: 100,
    }
}

/// Retry policy with millisecond delays
pub fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(2), max_retries, Duration::from_millis(20))
}

/// Client rooted at the mock server
pub fn client_for(server: &MockServer) -> Arc<RequestClient> {
    Arc::new(RequestClient::with_base_url(&server.uri()).unwrap())
}

/// Mount a start endpoint answering with `job_id`
pub async fn mount_start(server: &MockServer, endpoint: &str, job_id: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "job_id": job_id })))
        .mount(server)
        .await;
}

/// Mount a status endpoint reporting `running` for the first `running_polls`
/// requests and `final_body` afterwards
pub async fn mount_status_sequence(
    server: &MockServer,
    job_id: &str,
    running_polls: u64,
    progress: f64,
    final_body: serde_json::Value,
) {
    let status_path = format!("/jobs/{job_id}/status");
    Mock::given(method("GET"))
        .and(path(status_path.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "running", "progress": progress })),
        )
        .up_to_n_times(running_polls)
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(status_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(final_body))
        .with_priority(2)
        .mount(server)
        .await;
}
