//! Hosting API client
//!
//! [`ApiClient`] builds requests and interprets responses; the actual I/O is
//! done by an [`ApiTransport`], so the client can run against a canned
//! transport in tests.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::data::RepoDetailed;
use super::{RepositoryPath, ServerPath};
use crate::progress::CancellationToken;

const JSON_MIME_TYPE: &str = "application/json";
const USER_AGENT: &str = concat!("forksync/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_REASON: &str = "API rate limit exceeded";

/// Errors talking to the hosting API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response: {message}")]
    Malformed { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Request cancelled")]
    Cancelled,
}

/// A GET request against the hosting API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    pub accept: &'static str,
    /// Human readable operation, used in logs and error details
    pub operation: &'static str,
    pub token: Option<String>,
}

/// Raw response as returned by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(JSON_MIME_TYPE.to_string()),
            body: body.into(),
        }
    }

    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with(JSON_MIME_TYPE))
    }
}

/// Executes API requests
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<ApiResponse, ApiError>;
}

/// [`ApiTransport`] over HTTPS using reqwest
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Connection { message: e.to_string() })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn execute(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<ApiResponse, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        debug!(url = %request.url, operation = request.operation, "Connecting");

        let mut builder = self.client.get(&request.url).header(reqwest::header::ACCEPT, request.accept);
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        let send = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(ApiResponse {
                status,
                content_type,
                body,
            })
        };

        tokio::select! {
            result = send => {
                let response = result.map_err(|e| ApiError::Connection { message: e.to_string() })?;
                debug!(url = %request.url, status = response.status, "Response received");
                Ok(response)
            }
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<JsonErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct JsonErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl JsonError {
    fn presentable(&self) -> String {
        let mut text = self.message.clone().unwrap_or_default();
        for detail in &self.errors {
            if let Some(part) = detail.message.as_ref().or(detail.code.as_ref()) {
                if !text.is_empty() {
                    text.push_str("; ");
                }
                text.push_str(part);
            }
        }
        text
    }

    fn contains_reason(&self, reason: &str) -> bool {
        self.message.as_deref().is_some_and(|m| m.contains(reason))
            || self.errors.iter().any(|d| d.message.as_deref().is_some_and(|m| m.contains(reason)))
    }
}

/// Client for the few API calls a sync needs
pub struct ApiClient {
    transport: std::sync::Arc<dyn ApiTransport>,
    server: ServerPath,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(transport: std::sync::Arc<dyn ApiTransport>, server: ServerPath, token: Option<String>) -> Self {
        Self {
            transport,
            server,
            token,
        }
    }

    pub fn server(&self) -> &ServerPath {
        &self.server
    }

    /// `GET /repos/{owner}/{repo}`; `None` when the repository does not exist
    pub async fn repository(
        &self,
        path: &RepositoryPath,
        cancel: &CancellationToken,
    ) -> Result<Option<RepoDetailed>, ApiError> {
        let request = ApiRequest {
            url: format!("{}/repos/{}/{}", self.server.to_api_url(), path.owner, path.repository),
            accept: JSON_MIME_TYPE,
            operation: "get repository info",
            token: self.token.clone(),
        };
        let response = self.transport.execute(&request, cancel).await?;

        if response.status == 404 {
            debug!(url = %request.url, "Repository not found");
            return Ok(None);
        }
        check_status(&response)?;

        serde_json::from_str(&response.body).map(Some).map_err(|e| ApiError::Malformed {
            message: format!("Can't {}: {}", request.operation, e),
        })
    }
}

fn check_status(response: &ApiResponse) -> Result<(), ApiError> {
    if response.status < 400 {
        return Ok(());
    }

    let json_error = if response.is_json() {
        serde_json::from_str::<JsonError>(&response.body).ok()
    } else {
        None
    };
    let fallback = || {
        if response.body.trim().is_empty() {
            format!("HTTP {}", response.status)
        } else {
            response.body.trim().to_string()
        }
    };

    match response.status {
        401 | 402 | 403 => match &json_error {
            Some(err) if err.contains_reason(RATE_LIMIT_REASON) => Err(ApiError::RateLimited {
                message: err.presentable(),
            }),
            Some(err) => Err(ApiError::AuthFailed {
                message: err.presentable(),
            }),
            None => Err(ApiError::AuthFailed { message: fallback() }),
        },
        status => Err(ApiError::Status {
            status,
            message: json_error.map(|e| e.presentable()).unwrap_or_else(fallback),
        }),
    }
}
