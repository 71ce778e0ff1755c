//! REST client for the transcode backend's `/api/v1` endpoints.
//!
//! [`Transport`] is one request/response exchange that unwraps the
//! backend's `{data, message?}` envelope and classifies failures into
//! [`ApiError`]. [`HttpTransport`] implements it with [`reqwest`];
//! [`TranscodeApi`] layers the typed endpoints on top of any transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tmon_core::log::{LogEntry, LogList};
use tmon_core::query::{LogListQuery, TaskListQuery, VideoListQuery, WorkerListQuery};
use tmon_core::task::{Task, TaskStatus, TaskStatusUpdate};
use tmon_core::types::DbId;
use tmon_core::video::Video;
use tmon_core::worker::{OfflineAction, OfflineRequest, Worker, WorkerList};

/// Path prefix of every REST endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Upper bound on a single request, connection time included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the REST layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// No usable response: connection failure, timeout, or a failure
    /// response without a structured error body.
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
    },

    /// The backend answered with a structured `{message}` error body.
    #[error("Server error ({status}): {message}")]
    Server { message: String, status: u16 },

    /// A success response whose payload did not have the expected shape.
    #[error("Unexpected response payload: {message}")]
    Decode { message: String },
}

impl ApiError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Network { status, .. } => *status,
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Decode { .. } => None,
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return ApiError::Network {
                message: format!("timeout of {}ms exceeded", timeout.as_millis()),
                status: None,
            };
        }
        ApiError::Network {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// A video file plus the form options sent with `POST /tasks`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpload {
    pub file_name: String,
    pub content: Vec<u8>,
    /// Extra text parts, sent in order.
    pub fields: Vec<(String, String)>,
}

impl TaskUpload {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    fn into_form(self) -> reqwest::multipart::Form {
        let part = reqwest::multipart::Part::bytes(self.content).file_name(self.file_name);
        self.fields
            .into_iter()
            .fold(reqwest::multipart::Form::new().part("file", part), |form, (name, value)| {
                form.text(name, value)
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(TaskUpload),
}

/// One REST exchange. `path` is relative to [`API_PREFIX`] and may carry a
/// query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, RequestBody::Empty)
    }

    pub fn post(path: impl Into<String>, body: RequestBody) -> Self {
        Self::new(Method::Post, path, body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path, RequestBody::Json(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, RequestBody::Empty)
    }

    fn new(method: Method, path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A request/response exchange with the backend.
///
/// Implementations return only the envelope's `data` payload and never
/// retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

/// Success envelope: `{ "data": ..., "message": ... }`.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Value,
}

/// Error envelope: `{ "message": ... }`.
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Unwrap a raw response into the `data` payload or a classified error.
pub fn unwrap_envelope(status: u16, body: &[u8]) -> Result<Value, ApiError> {
    if (200..300).contains(&status) {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        return serde_json::from_slice::<Envelope>(body)
            .map(|envelope| envelope.data)
            .map_err(|e| ApiError::Decode {
                message: format!("invalid response envelope: {e}"),
            });
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(error) => Err(ApiError::Server {
            message: error.message,
            status,
        }),
        Err(_) => Err(ApiError::Network {
            message: format!("Request failed with status code {status}"),
            status: Some(status),
        }),
    }
}

/// [`Transport`] over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// * `base_url` - backend origin, e.g. `http://host:5000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::from_reqwest(e, timeout))?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    /// Reuse an existing [`reqwest::Client`]. `timeout` is only used to
    /// describe timeouts; configure it on the client itself.
    pub fn with_client(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            api_url: format!("{}{API_PREFIX}", base_url.trim_end_matches('/')),
            timeout,
        }
    }

    async fn exchange(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.api_url, request.path);
        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };
        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart(upload) => builder.multipart(upload.into_form()),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))?;

        unwrap_envelope(status, &body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let method = request.method;
        let path = request.path.clone();

        let result = self.exchange(request).await;
        if let Err(e) = &result {
            match e {
                ApiError::Server { message, status } => {
                    tracing::error!(?method, path = %path, status, "API error: {message}");
                }
                ApiError::Network { message, status } => {
                    tracing::error!(?method, path = %path, ?status, "Network error: {message}");
                }
                ApiError::Decode { message } => {
                    tracing::error!(?method, path = %path, "Decode error: {message}");
                }
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Typed endpoints
// ---------------------------------------------------------------------------

/// Typed wrappers over the backend's REST endpoints.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct TranscodeApi {
    transport: Arc<dyn Transport>,
}

impl TranscodeApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// API client over HTTP with the given request timeout.
    pub fn http(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self::new(Arc::new(HttpTransport::new(base_url, timeout)?)))
    }

    /// `GET /workers`
    pub async fn list_workers(&self, query: &WorkerListQuery) -> Result<Vec<Worker>, ApiError> {
        let data = self.get("/workers", &query.to_query_string()).await?;
        Ok(decode_or_default::<WorkerList>(data)?.workers)
    }

    /// `GET /tasks`
    pub async fn list_tasks(&self, query: &TaskListQuery) -> Result<Vec<Task>, ApiError> {
        let data = self.get("/tasks", &query.to_query_string()).await?;
        decode_or_default(data)
    }

    /// `POST /tasks` with the video as a multipart upload.
    pub async fn create_task(&self, upload: TaskUpload) -> Result<Task, ApiError> {
        let request = ApiRequest::post("/tasks", RequestBody::Multipart(upload));
        decode(self.transport.request(request).await?)
    }

    /// `PATCH /tasks/{task_id}`
    pub async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<Task, ApiError> {
        let body = serde_json::to_value(TaskStatusUpdate { status }).map_err(decode_error)?;
        let request = ApiRequest::patch(format!("/tasks/{task_id}"), body);
        decode(self.transport.request(request).await?)
    }

    /// Cancel a task through the task status endpoint.
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.update_task_status(task_id, TaskStatus::Cancelled).await
    }

    /// `GET /videos`
    pub async fn list_videos(&self, query: &VideoListQuery) -> Result<Vec<Video>, ApiError> {
        let data = self.get("/videos", &query.to_query_string()).await?;
        decode_or_default(data)
    }

    /// `GET /logs`
    pub async fn list_logs(&self, query: &LogListQuery) -> Result<Vec<LogEntry>, ApiError> {
        let data = self.get("/logs", &query.to_query_string()).await?;
        Ok(decode_or_default::<LogList>(data)?.logs)
    }

    /// `POST /workers/{id}/stop`
    pub async fn stop_worker(&self, worker_id: DbId) -> Result<Value, ApiError> {
        let request = ApiRequest::post(format!("/workers/{worker_id}/stop"), RequestBody::Empty);
        self.transport.request(request).await
    }

    /// `POST /workers/{id}/offline`
    pub async fn request_worker_offline(
        &self,
        worker_id: DbId,
        action: OfflineAction,
    ) -> Result<Value, ApiError> {
        let body = serde_json::to_value(OfflineRequest { action }).map_err(decode_error)?;
        let request = ApiRequest::post(format!("/workers/{worker_id}/offline"), RequestBody::Json(body));
        self.transport.request(request).await
    }

    /// `DELETE /workers/{id}/offline`
    pub async fn cancel_worker_offline(&self, worker_id: DbId) -> Result<Value, ApiError> {
        let request = ApiRequest::delete(format!("/workers/{worker_id}/offline"));
        self.transport.request(request).await
    }

    // ---- private helpers ----

    async fn get(&self, path: &str, query: &str) -> Result<Value, ApiError> {
        let path = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        };
        self.transport.request(ApiRequest::get(path)).await
    }
}

fn decode_error(err: serde_json::Error) -> ApiError {
    ApiError::Decode {
        message: err.to_string(),
    }
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(decode_error)
}

/// Like [`decode`], but a `null` payload means "nothing".
fn decode_or_default<T: DeserializeOwned + Default>(data: Value) -> Result<T, ApiError> {
    if data.is_null() {
        return Ok(T::default());
    }
    decode(data)
}
