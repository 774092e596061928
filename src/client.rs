//! Resilient HTTP request client
//!
//! [`RequestClient::request`] runs one logical operation under a [`RetryPolicy`]:
//! every attempt gets its own timeout, 4xx answers stop immediately, and
//! timeouts, network failures and 5xx answers are retried with linear backoff.
//! Whatever happens, the caller receives a [`RequestOutcome`]; failures are
//! never raised as errors.
//!
//! # Example
//!
//! ```no_run
//! use taskwatch::client::{RequestClient, RequestOptions};
//! use taskwatch::config::RetryPolicy;
//!
//! # async fn example() -> taskwatch::Result<()> {
//! let client = RequestClient::with_base_url("http://analytics.internal/api/")?;
//! let outcome = client
//!     .request("entities/stats", &RequestOptions::get(), &RetryPolicy::reads())
//!     .await;
//!
//! match outcome.error() {
//!     None => println!("stats: {:?}", outcome.data()),
//!     Some(error) => eprintln!("failed: {error}"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::RetryPolicy;
use crate::error::{Error, RequestError, Result};
use crate::retry::with_retry;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// Maximum number of body characters quoted in a status error
const ERROR_BODY_EXCERPT_CHARS: usize = 200;

/// Uniform result of a request: data on success, an error message otherwise
///
/// Serializes to `{"success": true, "data": ...}` or
/// `{"success": false, "error": "..."}`.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestOutcome<T> {
    /// The request succeeded
    Success(T),
    /// The request failed; the message of the last failure
    Failure(String),
}

impl<T> RequestOutcome<T> {
    /// True for [`RequestOutcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }

    /// Data of a successful outcome
    pub fn data(&self) -> Option<&T> {
        match self {
            RequestOutcome::Success(data) => Some(data),
            RequestOutcome::Failure(_) => None,
        }
    }

    /// Error message of a failed outcome
    pub fn error(&self) -> Option<&str> {
        match self {
            RequestOutcome::Success(_) => None,
            RequestOutcome::Failure(error) => Some(error),
        }
    }

    /// Transform the data of a successful outcome
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RequestOutcome<U> {
        match self {
            RequestOutcome::Success(data) => RequestOutcome::Success(f(data)),
            RequestOutcome::Failure(error) => RequestOutcome::Failure(error),
        }
    }

    /// Chain a fallible transformation onto a successful outcome
    pub fn and_then<U, F: FnOnce(T) -> RequestOutcome<U>>(self, f: F) -> RequestOutcome<U> {
        match self {
            RequestOutcome::Success(data) => f(data),
            RequestOutcome::Failure(error) => RequestOutcome::Failure(error),
        }
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> std::result::Result<T, String> {
        match self {
            RequestOutcome::Success(data) => Ok(data),
            RequestOutcome::Failure(error) => Err(error),
        }
    }
}

impl<T: Serialize> Serialize for RequestOutcome<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("RequestOutcome", 2)?;
        match self {
            RequestOutcome::Success(data) => {
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
            }
            RequestOutcome::Failure(error) => {
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
            }
        }
        s.end()
    }
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RawOutcome<T> {
    success: bool,
    /// `None` only when the field is missing; `"data": null` is `Some`
    #[serde(default, deserialize_with = "present")]
    data: Option<T>,
    error: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RequestOutcome<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawOutcome::<T>::deserialize(deserializer)?;
        match (raw.success, raw.data, raw.error) {
            (true, Some(data), None) => Ok(RequestOutcome::Success(data)),
            (false, None, Some(error)) => Ok(RequestOutcome::Failure(error)),
            _ => Err(D::Error::custom(
                "outcome must carry data on success or error on failure",
            )),
        }
    }
}

/// Request body
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with `Content-Type: application/json`
    Json(serde_json::Value),
    /// Sent verbatim
    Text(String),
}

/// Method, headers and body of a request
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOptions {
    /// HTTP method
    pub method: Method,
    /// Extra headers for this request
    pub headers: Vec<(String, String)>,
    /// Optional body
    pub body: Option<RequestBody>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    /// Options for the given method without headers or body
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request
    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    /// DELETE request
    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// POST request with a JSON body
    pub fn post_json(body: serde_json::Value) -> Self {
        Self::new(Method::POST).json_body(body)
    }

    /// PUT request with a JSON body
    pub fn put_json(body: serde_json::Value) -> Self {
        Self::new(Method::PUT).json_body(body)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body with JSON
    #[must_use]
    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Replace the body with raw text
    #[must_use]
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }
}

/// Decoded body of a successful response
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// Declared content type was JSON (`application/json` or `*+json`)
    Json(serde_json::Value),
    /// Any other content type
    Text(String),
}

impl ResponseBody {
    /// JSON value, if the response was JSON
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    /// Decode into `T`, accepting text bodies that contain JSON
    pub fn decode<T: DeserializeOwned>(self) -> std::result::Result<T, RequestError> {
        let decoded = match self {
            ResponseBody::Json(value) => serde_json::from_value(value),
            ResponseBody::Text(text) => serde_json::from_str(&text),
        };
        decoded.map_err(|e| RequestError::Decode(e.to_string()))
    }
}

/// HTTP client that applies a retry policy to every request
///
/// Each call to [`request`](Self::request) is independent; the client holds no
/// per-request state and can be shared across tasks.
#[derive(Clone, Debug)]
pub struct RequestClient {
    http: reqwest::Client,
    base_url: Option<Url>,
    default_headers: HeaderMap,
}

impl RequestClient {
    /// Client for absolute endpoint URLs
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: None,
            default_headers: HeaderMap::new(),
        })
    }

    /// Client that resolves relative endpoints against `base_url`
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let mut url = Url::parse(base_url)?;
        // Url::join replaces the last path segment unless the base ends in '/'
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            base_url: Some(url),
            ..Self::new()?
        })
    }

    /// Add a header sent with every request (e.g. an API token)
    pub fn with_default_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config("default_headers", e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::config("default_headers", e.to_string()))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Base URL, if configured
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve an endpoint to an absolute URL
    pub fn resolve(&self, endpoint: &str) -> std::result::Result<Url, RequestError> {
        let resolved = match &self.base_url {
            Some(base) if Url::parse(endpoint).is_err() => {
                base.join(endpoint.trim_start_matches('/'))
            }
            _ => Url::parse(endpoint),
        };
        resolved.map_err(|e| RequestError::InvalidRequest(format!("{endpoint}: {e}")))
    }

    /// Execute a request under `policy`, returning a uniform outcome
    pub async fn request(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        policy: &RetryPolicy,
    ) -> RequestOutcome<ResponseBody> {
        if let Err(e) = policy.validate() {
            return RequestOutcome::Failure(e.to_string());
        }

        let url = match self.resolve(endpoint) {
            Ok(url) => url,
            Err(e) => return RequestOutcome::Failure(e.to_string()),
        };

        tracing::debug!(
            method = %options.method,
            url = %url,
            max_retries = policy.max_retries,
            "sending request"
        );

        let result = with_retry(policy, |attempt| {
            let url = &url;
            async move {
                tracing::trace!(url = %url, attempt, "request attempt");
                self.attempt(url, options).await
            }
        })
        .await;

        match result {
            Ok(body) => RequestOutcome::Success(body),
            Err(e) => {
                tracing::warn!(method = %options.method, url = %url, error = %e, "request failed");
                RequestOutcome::Failure(e.to_string())
            }
        }
    }

    /// Execute a request and decode a successful body into `T`
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        policy: &RetryPolicy,
    ) -> RequestOutcome<T> {
        self.request(endpoint, options, policy)
            .await
            .and_then(|body| match body.decode() {
                Ok(data) => RequestOutcome::Success(data),
                Err(e) => RequestOutcome::Failure(e.to_string()),
            })
    }

    /// GET `endpoint` under `policy`
    pub async fn get(&self, endpoint: &str, policy: &RetryPolicy) -> RequestOutcome<ResponseBody> {
        self.request(endpoint, &RequestOptions::get(), policy).await
    }

    /// POST a JSON body to `endpoint` under `policy`
    pub async fn post_json(
        &self,
        endpoint: &str,
        body: serde_json::Value,
        policy: &RetryPolicy,
    ) -> RequestOutcome<ResponseBody> {
        self.request(endpoint, &RequestOptions::post_json(body), policy)
            .await
    }

    /// One attempt: send, check status, decode by content type
    async fn attempt(
        &self,
        url: &Url,
        options: &RequestOptions,
    ) -> std::result::Result<ResponseBody, RequestError> {
        let mut request = self
            .http
            .request(options.method.clone(), url.clone())
            .headers(self.default_headers.clone());

        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request = match &options.body {
            Some(RequestBody::Json(value)) => request.json(value),
            Some(RequestBody::Text(text)) => request.body(text.clone()),
            None => request,
        };

        let response = request.send().await.map_err(classify_send_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => excerpt(&body),
                Err(e) => {
                    tracing::debug!(
                        url = %url,
                        status = status.as_u16(),
                        error = %e,
                        "failed to read error body"
                    );
                    format!("(body unreadable: {e})")
                }
            };
            return Err(RequestError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_json_content_type);

        let text = response.text().await.map_err(RequestError::Network)?;

        if !is_json {
            return Ok(ResponseBody::Text(text));
        }
        if text.trim().is_empty() {
            return Ok(ResponseBody::Json(serde_json::Value::Null));
        }
        serde_json::from_str(&text)
            .map(ResponseBody::Json)
            .map_err(|e| RequestError::Decode(e.to_string()))
    }
}

fn classify_send_error(e: reqwest::Error) -> RequestError {
    if e.is_builder() {
        RequestError::InvalidRequest(e.to_string())
    } else {
        RequestError::Network(e)
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "(empty body)".to_string();
    }
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(ERROR_BODY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
