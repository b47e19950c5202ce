//! Session-gated HTTP gateway to the care portal backend.
//!
//! Every authenticated call checks the stored token locally before touching
//! the network. A missing or expired token purges the session and fails with
//! [`ApiError::SessionExpired`]. Responses are normalized into
//! [`ApiResponse`]: parsed JSON when the server declares a JSON content type,
//! the raw response otherwise.

use crate::config::ApiSettings;
use crate::error::ApiError;
use crate::services::metrics::{record_request, record_session_expired};
use crate::session::{ClearReason, SessionManager};
use crate::utils::jwt::is_token_expired;
use portal_core::observability::TracedRequestExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, multipart};
use serde_json::{Map, Value};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// File name used when a download has none.
pub const DEFAULT_DOWNLOAD_NAME: &str = "report";

/// One outbound call: path relative to the base URL, method, optional JSON
/// body and extra headers. Extra headers override the defaults.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Normalized result of a successful call.
#[derive(Debug)]
pub enum ApiResponse {
    /// Body parsed from a JSON response (`{}` when it did not parse).
    Json(Value),
    /// Any non-JSON response, handed back untouched.
    Raw(Response),
}

impl ApiResponse {
    pub fn is_json(&self) -> bool {
        matches!(self, ApiResponse::Json(_))
    }

    /// The parsed body, or `UnexpectedResponse` for a non-JSON reply.
    pub fn into_json(self) -> Result<Value, ApiError> {
        match self {
            ApiResponse::Json(value) => Ok(value),
            ApiResponse::Raw(response) => {
                tracing::warn!(
                    status = %response.status(),
                    url = %response.url(),
                    "Expected JSON response"
                );
                Err(ApiError::UnexpectedResponse)
            }
        }
    }

    pub fn into_raw(self) -> Option<Response> {
        match self {
            ApiResponse::Raw(response) => Some(response),
            ApiResponse::Json(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiGateway {
    client: Client,
    base_url: String,
    session: Arc<SessionManager>,
}

impl ApiGateway {
    pub fn new(settings: &ApiSettings, session: Arc<SessionManager>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Absolute URL for `path`, for endpoints consumed by navigation.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticated call. Fails with `SessionExpired` before any network
    /// access when the stored token is missing or expired.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn send(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let token = self.authorize().await?;
        self.dispatch(request, Some(&token), cancel).await
    }

    /// Unauthenticated call with the same response normalization.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn send_public(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        self.dispatch(request, None, cancel).await
    }

    /// Unauthenticated multipart POST (file uploads).
    #[instrument(skip(self, form, cancel))]
    pub async fn send_multipart(
        &self,
        path: &str,
        form: multipart::Form,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let builder = self.client.post(self.url(path)).multipart(form);
        let response = self.execute(builder, &Method::POST, path, cancel).await?;
        normalize(response, cancel).await
    }

    /// Authenticated binary download saved as `dest_dir/<filename>`.
    ///
    /// The body is staged in a temp file inside `dest_dir` and renamed into
    /// place once complete; the temp file is removed on every failure path.
    #[instrument(skip(self, dest_dir, cancel), fields(dest_dir = %dest_dir.display()))]
    pub async fn download(
        &self,
        path: &str,
        filename: Option<&str>,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let token = self.authorize().await?;
        let builder = self
            .client
            .get(self.url(path))
            .header(AUTHORIZATION, bearer(&token)?);

        self.fetch_to_file(builder, path, filename, dest_dir, cancel)
            .await
    }

    /// Unauthenticated binary download.
    #[instrument(skip(self, dest_dir, cancel), fields(dest_dir = %dest_dir.display()))]
    pub async fn download_public(
        &self,
        path: &str,
        filename: Option<&str>,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let builder = self.client.get(self.url(path));
        self.fetch_to_file(builder, path, filename, dest_dir, cancel)
            .await
    }

    async fn authorize(&self) -> Result<String, ApiError> {
        let token = self.read_token().await;
        if let Some(token) = token.as_deref().filter(|t| !is_token_expired(Some(*t))) {
            return Ok(token.to_string());
        }

        match self
            .session
            .clear_if_token(token.as_deref(), ClearReason::Expired)
            .await
        {
            Ok(true) => {}
            // A login replaced the session after the check; judge the new token.
            Ok(false) => {
                if let Some(fresh) = self.read_token().await
                    && !is_token_expired(Some(&fresh))
                {
                    return Ok(fresh);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired session"),
        }

        record_session_expired();
        tracing::info!("Session token missing or expired, request not sent");
        Err(ApiError::SessionExpired)
    }

    async fn read_token(&self) -> Option<String> {
        self.session.token().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read session token");
            None
        })
    }

    async fn dispatch(
        &self,
        request: ApiRequest,
        token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        let ApiRequest {
            path,
            method,
            body,
            headers: extra_headers,
        } = request;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            headers.insert(AUTHORIZATION, bearer(token)?);
        }
        headers.extend(extra_headers);

        let mut builder = self
            .client
            .request(method.clone(), self.url(&path))
            .headers(headers);
        if let Some(body) = body.filter(|body| !body.is_null()) {
            builder = builder.body(serde_json::to_vec(&body)?);
        }

        let response = self.execute(builder, &method, &path, cancel).await?;
        normalize(response, cancel).await
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        method: &Method,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Response, ApiError> {
        tracing::debug!(%method, path, "Sending portal API request");
        let started = Instant::now();

        let response = until_cancelled(cancel, builder.with_trace_context().send())
            .await
            .inspect_err(|e| {
                if !matches!(e, ApiError::Cancelled) {
                    tracing::error!(%method, path, error = %e, "Portal API request failed");
                }
            })?;

        record_request(method, path, response.status(), started.elapsed());
        Ok(response)
    }

    async fn fetch_to_file(
        &self,
        builder: RequestBuilder,
        path: &str,
        filename: Option<&str>,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError> {
        let response = self.execute(builder, &Method::GET, path, cancel).await?;

        let status = response.status();
        if !status.is_success() {
            let data = read_json(response, cancel).await?;
            tracing::warn!(path, %status, "Download failed");
            return Err(ApiError::http(status, message_of(&data)));
        }

        let bytes = until_cancelled(cancel, response.bytes()).await?;
        let size = bytes.len();
        let name = download_file_name(filename);
        let dir = dest_dir.to_path_buf();
        let cancel = cancel.clone();

        let target = tokio::task::spawn_blocking(move || save_download(&dir, &name, &bytes, &cancel))
            .await
            .map_err(|e| ApiError::Io(std::io::Error::other(e)))??;

        tracing::info!(path, file = %target.display(), size, "Download saved");
        Ok(target)
    }
}

fn bearer(token: &str) -> Result<HeaderValue, ApiError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ApiError::InvalidRequest("session token is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, future: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, reqwest::Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = future => result.map_err(ApiError::from),
    }
}

fn declares_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

fn message_of(data: &Value) -> Option<&str> {
    data.get("message").and_then(Value::as_str)
}

/// Read the body as JSON, degrading to `{}` when it cannot be read or parsed.
async fn read_json(response: Response, cancel: &CancellationToken) -> Result<Value, ApiError> {
    match until_cancelled(cancel, response.bytes()).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::Object(Map::new()))),
        Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read response body");
            Ok(Value::Object(Map::new()))
        }
    }
}

async fn normalize(response: Response, cancel: &CancellationToken) -> Result<ApiResponse, ApiError> {
    let status = response.status();

    if !declares_json(&response) {
        if status.is_success() {
            return Ok(ApiResponse::Raw(response));
        }
        return Err(ApiError::http(status, None));
    }

    let data = read_json(response, cancel).await?;
    if !status.is_success() {
        return Err(ApiError::http(status, message_of(&data)));
    }

    Ok(ApiResponse::Json(data))
}

/// Last path component of the suggested name, or the default.
fn download_file_name(filename: Option<&str>) -> String {
    filename
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or(DEFAULT_DOWNLOAD_NAME)
        .to_string()
}

fn save_download(
    dir: &Path,
    name: &str,
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<PathBuf, ApiError> {
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;

    // Dropping `staged` removes the partial file.
    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }

    let target = dir.join(name);
    staged.persist(&target).map_err(|e| e.error)?;
    Ok(target)
}
