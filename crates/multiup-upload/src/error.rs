//! Error types for multiup-upload.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploadError>;

/// Classification of a failed upload step, as consumed by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A local precondition failed: missing file, disabled host, empty credential.
    Validation,
    /// Bad credentials, unsolved CAPTCHA, rejected login or stale session.
    Authentication,
    /// Connection reset, DNS failure or another transport fault.
    Network,
    /// HTTP 5xx.
    Server,
    /// HTTP 4xx other than 401/403, or a response the host flagged as an error.
    Client,
    /// The host never finished processing, or the socket timed out.
    Timeout,
    Cancelled,
}

impl ErrorKind {
    /// Whether a fresh attempt in a later pass may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("server error (HTTP {status}): {message}")]
    Server {
        status: u16,
        message: String,
        body: String,
    },

    #[error("request rejected (HTTP {status}): {message}")]
    Client {
        status: u16,
        message: String,
        body: String,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("token store error: {0}")]
    Store(#[from] sled::Error),

    #[error("token encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Validation(_)
            | UploadError::Store(_)
            | UploadError::Encoding(_)
            | UploadError::Io(_) => ErrorKind::Validation,
            UploadError::Authentication { .. } => ErrorKind::Authentication,
            UploadError::Network(_) => ErrorKind::Network,
            UploadError::Server { .. } => ErrorKind::Server,
            UploadError::Client { .. } => ErrorKind::Client,
            UploadError::Timeout(_) => ErrorKind::Timeout,
            UploadError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// HTTP status of the response that caused this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Authentication { status, .. } => *status,
            UploadError::Server { status, .. } | UploadError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Body of the response that caused this error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            UploadError::Authentication { body, .. } => body.as_deref(),
            UploadError::Server { body, .. } | UploadError::Client { body, .. } => Some(body),
            _ => None,
        }
    }

    /// A copy of this error for callers that shared the operation behind it.
    pub(crate) fn replay(&self) -> UploadError {
        match self {
            UploadError::Validation(m) => UploadError::Validation(m.clone()),
            UploadError::Authentication { message, status, body } => UploadError::Authentication {
                message: message.clone(),
                status: *status,
                body: body.clone(),
            },
            UploadError::Network(m) => UploadError::Network(m.clone()),
            UploadError::Server { status, message, body } => UploadError::Server {
                status: *status,
                message: message.clone(),
                body: body.clone(),
            },
            UploadError::Client { status, message, body } => UploadError::Client {
                status: *status,
                message: message.clone(),
                body: body.clone(),
            },
            UploadError::Timeout(m) => UploadError::Timeout(m.clone()),
            UploadError::Cancelled => UploadError::Cancelled,
            UploadError::Store(e) => UploadError::Validation(format!("token store error: {e}")),
            UploadError::Encoding(e) => UploadError::Validation(format!("token encoding error: {e}")),
            UploadError::Io(e) => UploadError::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }

    pub(crate) fn auth(message: impl Into<String>) -> Self {
        UploadError::Authentication {
            message: message.into(),
            status: None,
            body: None,
        }
    }
}

/// Failure of the HTTP seam itself, before any response was read.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Cancelled,
    /// Reading the local file failed.
    Io,
    Request,
    TooManyRedirects,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connection failed",
            TransportErrorKind::Timeout => "request timed out",
            TransportErrorKind::Cancelled => "transfer cancelled",
            TransportErrorKind::Io => "file read failed",
            TransportErrorKind::Request => "request failed",
            TransportErrorKind::TooManyRedirects => "too many redirects",
        };
        f.write_str(name)
    }
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "cancel requested")
    }
}

impl From<TransportError> for UploadError {
    fn from(e: TransportError) -> Self {
        match e.kind {
            TransportErrorKind::Cancelled => UploadError::Cancelled,
            TransportErrorKind::Timeout => UploadError::Timeout(e.message),
            TransportErrorKind::Io => UploadError::Validation(e.to_string()),
            TransportErrorKind::Connect
            | TransportErrorKind::Request
            | TransportErrorKind::TooManyRedirects => UploadError::Network(e.to_string()),
        }
    }
}

/// Gallery-level failures that abort the whole upload.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("creating the gallery on {host} with {file} failed: {source}")]
    GalleryCreation {
        host: String,
        file: String,
        #[source]
        source: UploadError,
    },

    #[error("invalid gallery request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Host(#[from] multiup_hosts::HostError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("failed to start upload runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
