//! External model providers.
//!
//! The pipeline talks to two remote models: an embedding model (text to
//! fixed-length vector) and a generative chat model (prompt to text).
//! Both are behind traits so tests can inject deterministic fakes.

pub mod embedding;
pub mod generative;

pub use embedding::{chunk_text, EmbeddingProvider, OpenAiEmbeddings};
pub use generative::{GenerativeProvider, OpenAiChat};

use std::time::Duration;

/// Errors from embedding or generative model calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Timeouts, connect failures and 5xx are worth retrying; client
    /// errors (bad key, malformed request) are not.
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(err) => err.is_timeout() || err.is_connect(),
            ProviderError::Status { status, .. } => (500..=599).contains(status),
            ProviderError::MalformedResponse(_) => false,
        }
    }
}

/// Run `op` with bounded retries and exponential backoff plus jitter.
pub(crate) fn with_retry<T>(
    what: &str,
    max_retries: u32,
    mut op: impl FnMut() -> Result<T, ProviderError>,
) -> Result<T, ProviderError> {
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && err.is_retryable() => {
                attempt += 1;
                let delay =
                    Duration::from_millis(500 * 2u64.pow(attempt - 1) + rand::random::<u64>() % 250);
                log::warn!(
                    "{what}: retrying (attempt {attempt}/{max_retries}) after error: {err}, backoff {delay:?}"
                );
                std::thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Build a blocking HTTP client with a per-call timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, ProviderError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_error_fails_immediately() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("test", 3, || {
            calls += 1;
            Err(ProviderError::Status {
                status: 401,
                body: "bad key".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retryable_error_is_retried_up_to_limit() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("test", 2, || {
            calls += 1;
            Err(ProviderError::Status {
                status: 503,
                body: "overloaded".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn success_after_transient_failure() {
        let mut calls = 0;
        let result = with_retry("test", 3, || {
            calls += 1;
            if calls < 2 {
                Err(ProviderError::Status {
                    status: 500,
                    body: String::new(),
                })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[test]
    fn malformed_response_is_not_retryable() {
        let err = ProviderError::MalformedResponse("empty".to_string());
        assert!(!err.is_retryable());
    }
}
