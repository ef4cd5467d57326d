//! Error types for the orchestrator.

use crate::host_pool::StageKind;

/// Startup configuration errors. Any of these prevents the orchestrator from serving.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No {stage} workers configured")]
    EmptyPool { stage: StageKind },

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid endpoint for {stage} pool: {address:?}")]
    InvalidEndpoint { stage: StageKind, address: String },

    #[error("max_inflight_per_endpoint must be at least 1")]
    ZeroLeaseSlots,
}

/// Failures while talking to a stage worker.
///
/// These never leave the stage client: they are flattened into
/// `StageOutcome::Failure` messages.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("worker {url} unreachable: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("worker {url} timed out: {source}")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("worker {url} broke off the response: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("worker {url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("{0}")]
    Rejected(String),
}

impl StageError {
    /// Classifies a failure to get a response at all.
    pub fn request(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();
        if source.is_timeout() {
            StageError::Timeout { url, source }
        } else {
            StageError::Transport { url, source }
        }
    }

    /// Classifies a failure while reading an accepted response.
    pub fn body(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();
        if source.is_timeout() {
            StageError::Timeout { url, source }
        } else {
            StageError::Body { url, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_display() {
        let err = ConfigError::EmptyPool {
            stage: StageKind::Watermark,
        };
        assert_eq!(err.to_string(), "No Watermark workers configured");
    }

    #[test]
    fn test_status_display() {
        let err = StageError::Status {
            url: "http://w1:50053/apply_filter".to_string(),
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "worker http://w1:50053/apply_filter returned HTTP 503: busy"
        );
    }

    #[test]
    fn test_rejected_is_passthrough() {
        let err = StageError::Rejected("cannot identify image file".to_string());
        assert_eq!(err.to_string(), "cannot identify image file");
    }
}
