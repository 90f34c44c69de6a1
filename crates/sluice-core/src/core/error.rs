//! Error types for the streaming pipeline.
//!
//! There is no parse error: every character sequence is valid scanner input
//! and unbalanced fences are resolved at end of stream. What remains is
//! misuse of the pipeline (`StreamError`) and failures of the upstream
//! chunk source (`UpstreamError`), which are recovered by finalizing.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Invariant violation inside the pipeline.
///
/// Never produced under correct use. Callers should treat it as fatal for
/// the stream that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A collaborator acted out of order: appended to a closed block, opened
    /// a second live block, or began a stream before the previous one
    /// finalized.
    OrderingViolation(String),
}

impl StreamError {
    pub fn ordering(detail: impl Into<String>) -> Self {
        StreamError::OrderingViolation(detail.into())
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::OrderingViolation(detail) => write!(f, "ordering violation: {detail}"),
        }
    }
}

impl std::error::Error for StreamError {}

/// Category of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// Reading from the source failed (network, pipe, file).
    Io,
    /// No chunk arrived within the configured idle timeout
    Timeout,
    /// The source reported a failure of its own
    Source,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamErrorKind::Io => write!(f, "io"),
            UpstreamErrorKind::Timeout => write!(f, "timeout"),
            UpstreamErrorKind::Source => write!(f, "source"),
        }
    }
}

/// Abnormal termination of the chunk source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    /// One-line summary suitable for display
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(err: &std::io::Error) -> Self {
        Self::new(UpstreamErrorKind::Io, err.to_string())
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            UpstreamErrorKind::Timeout,
            format!("no chunk received within {}s", limit.as_secs_f32()),
        )
    }

    pub fn source(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Source, message)
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for UpstreamError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_violation_display() {
        let err = StreamError::ordering("append with no live block");
        assert_eq!(err.to_string(), "ordering violation: append with no live block");
    }

    #[test]
    fn test_upstream_timeout_message() {
        let err = UpstreamError::timeout(Duration::from_secs(2));
        assert_eq!(err.kind, UpstreamErrorKind::Timeout);
        assert_eq!(err.to_string(), "no chunk received within 2s (timeout)");
    }

    #[test]
    fn test_upstream_error_serializes_kind_snake_case() {
        let err = UpstreamError::source("connection reset");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "source");
        assert_eq!(json["message"], "connection reset");
    }
}
