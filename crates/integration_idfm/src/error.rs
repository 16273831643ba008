//! Stop watcher error types

use thiserror::Error;

/// Errors that can occur while querying the catalog or the realtime service
#[derive(Debug, Clone, Error)]
pub enum IdfmError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection to a remote service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Remote service answered with a non-success status
    #[error("{service} request failed: HTTP {status}")]
    RequestFailed {
        /// Which service was called ("catalog" or "realtime")
        service: &'static str,
        /// HTTP status code
        status: u16,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimitExceeded {
        /// Seconds to wait before retrying (if provided by API)
        retry_after_secs: Option<u64>,
    },

    /// Failed to decode a response body
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Realtime response carried no stop monitoring delivery
    #[error("StopMonitoringDelivery missing from realtime response")]
    MissingDelivery,

    /// The catalog returned no record for a line identifier
    #[error("No line record found for {0}")]
    LineNotFound(String),

    /// A relative time could not be rendered
    #[error("Formatting error: {0}")]
    Formatting(String),

    /// Request timeout
    #[error("Request timed out after {timeout_secs} seconds")]
    Timeout {
        /// The timeout duration in seconds
        timeout_secs: u64,
    },
}

impl IdfmError {
    /// Returns true if this error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::Timeout { .. }
                | Self::RateLimitExceeded { .. }
                | Self::RequestFailed { status: 500..=599, .. }
        )
    }

    /// Returns true if the remote answered but an expected record was absent
    #[must_use]
    pub const fn is_missing_data(&self) -> bool {
        matches!(self, Self::MissingDelivery | Self::LineNotFound(_))
    }

    /// Map a transport error, distinguishing timeouts
    pub(crate) fn from_transport(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::ConnectionFailed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(IdfmError::ConnectionFailed("test".to_string()).is_retryable());
        assert!(IdfmError::Timeout { timeout_secs: 10 }.is_retryable());
        assert!(
            IdfmError::RateLimitExceeded {
                retry_after_secs: Some(60)
            }
            .is_retryable()
        );
        assert!(
            IdfmError::RequestFailed {
                service: "realtime",
                status: 503
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!IdfmError::Configuration("test".to_string()).is_retryable());
        assert!(!IdfmError::ParseError("test".to_string()).is_retryable());
        assert!(!IdfmError::MissingDelivery.is_retryable());
        assert!(!IdfmError::LineNotFound("C01371".to_string()).is_retryable());
        assert!(
            !IdfmError::RequestFailed {
                service: "catalog",
                status: 404
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_missing_data_classification() {
        assert!(IdfmError::MissingDelivery.is_missing_data());
        assert!(IdfmError::LineNotFound("C01371".to_string()).is_missing_data());
        assert!(!IdfmError::Formatting("x".to_string()).is_missing_data());
    }

    #[test]
    fn test_error_display() {
        let err = IdfmError::LineNotFound("C01371".to_string());
        assert!(err.to_string().contains("C01371"));

        let err = IdfmError::RequestFailed {
            service: "catalog",
            status: 502,
        };
        assert_eq!(err.to_string(), "catalog request failed: HTTP 502");

        let err = IdfmError::Timeout { timeout_secs: 10 };
        assert!(err.to_string().contains("10"));
    }
}
