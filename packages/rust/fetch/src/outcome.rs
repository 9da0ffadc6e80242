//! Result types for a single logical fetch.

use std::collections::BTreeMap;
use std::fmt;

/// Classification of a terminal fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// An attempt exceeded its hard timeout.
    Timeout,
    /// Connection, DNS, TLS or body-read failure.
    Network,
    /// Non-2xx response.
    Http,
    /// robots.txt forbids the URL. Never retried.
    RobotsBlocked,
    /// The server kept answering 429 until retries ran out.
    RateLimited,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Http => "http",
            Self::RobotsBlocked => "robots_blocked",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    pub status: u16,
    /// Response headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
    /// Whether `final_url` differs from the requested URL.
    pub redirected: bool,
}

/// A terminal failure, reported after all applicable retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
    /// HTTP status of the last response, if any.
    pub status: Option<u16>,
}

impl FetchFailure {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            status: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Exactly one of these is produced per [`crate::Fetcher::fetch`] call.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(FetchSuccess),
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a `Result` for `?`-style handling by callers.
    pub fn into_result(self) -> std::result::Result<FetchSuccess, FetchFailure> {
        match self {
            Self::Success(success) => Ok(success),
            Self::Failure(failure) => Err(failure),
        }
    }
}
