//! Shared blocking transport and failure classification.
//!
//! Every client makes exactly one attempt per call. The engine owns retries,
//! so all this layer does is turn transport and status failures into a
//! [`FailureKind`].

use std::time::Duration;

use regmerge_recon::{CallError, FailureKind};

pub(crate) const USER_AGENT: &str = concat!("regmerge/", env!("CARGO_PKG_VERSION"));

/// Error type for HTTP-backed collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {message}")]
    Network { message: String, transient: bool },
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    /// The service answered but reported the call as unsuccessful.
    #[error("{0}")]
    Rejected(String),
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network { transient: true, .. } => FailureKind::Transient,
            Self::Network { .. } => FailureKind::Permanent,
            Self::Http { status, .. } => classify_status(*status),
            Self::Parse(_) | Self::Rejected(_) => FailureKind::Permanent,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        let transient = e.is_timeout() || e.is_connect() || e.is_request() || e.is_body();
        ClientError::Network {
            message: e.to_string(),
            transient,
        }
    }
}

impl From<ClientError> for CallError {
    fn from(e: ClientError) -> Self {
        CallError::new(e.kind(), e.to_string())
    }
}

/// Map an HTTP status to a failure class.
///
/// 401/403 auth, 400/422 validation, 404 not found, 408/429/5xx transient,
/// anything else permanent.
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        401 | 403 => FailureKind::Auth,
        400 | 422 => FailureKind::Validation,
        404 => FailureKind::NotFound,
        408 | 429 | 500..=599 => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

/// Blocking reqwest client with one timeout for every request.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { http }
    }

    pub fn client(&self) -> &reqwest::blocking::Client {
        &self.http
    }

    /// Send and fail on any non-2xx status, keeping the body for the message.
    pub fn send(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response, ClientError> {
        let response = request.send()?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Http {
                status,
                body: truncate(&body, 300),
            });
        }
        Ok(response)
    }

    pub fn send_json(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, ClientError> {
        let response = self.send(request)?;
        response.json().map_err(|e| ClientError::Parse(e.to_string()))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
