//! Error types for inbox-sweeper
//!
//! [`Error`] covers local failures (configuration, connection setup,
//! query parsing). Failures reported by the remote store during a bulk
//! mutation are [`StoreError`] values and are never raised past the
//! mutator; they are classified into an [`ErrorKind`] and recorded in
//! the result instead.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by a [`RemoteMailStore`](crate::RemoteMailStore)
/// call.
///
/// `status` follows HTTP conventions (403, 404, 429, 5xx) regardless of
/// the transport; `body` is the raw provider message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("status {status}: {body}")]
pub struct StoreError {
    pub status: u16,
    pub body: String,
    /// Provider-advertised delay before the caller may try again.
    pub retry_after: Option<Duration>,
}

impl StoreError {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Classification of a failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Temporary server-side fault; eligible for retry.
    Transient,
    /// 403.
    PermissionDenied,
    /// 404: stale or invalid message identifiers.
    NotFound,
    /// 429: the caller must wait before resuming.
    QuotaExceeded,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
