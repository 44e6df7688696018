use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors produced by [`GraphClient`](crate::GraphClient) operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Non-retryable API error (4xx other than 429, or a token grant
    /// rejection). Carries the status and response body text.
    #[error("Graph API error {status}: {message}")]
    Api { status: u16, message: String },

    /// All retry attempts were consumed without a successful response.
    #[error("Graph API request failed after {attempts} attempts (last status {last_status})")]
    RetriesExhausted { attempts: u32, last_status: u16 },

    /// The cancellation token fired while waiting or between attempts.
    #[error("request aborted")]
    Aborted,

    /// The token endpoint answered 2xx but the body had no access token.
    #[error("token endpoint returned no access token")]
    EmptyToken,

    /// Transport-level failure (connect, decode, timeout).
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl GraphError {
    /// Whether this failure is the cooperative-cancellation condition.
    ///
    /// Callers use this to tell an aborted fetch apart from a genuine
    /// failure: an aborted item is marked cancelled, not failed.
    pub fn is_aborted(&self) -> bool {
        matches!(self, GraphError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_is_distinguished() {
        assert!(GraphError::Aborted.is_aborted());
        assert!(!GraphError::Api {
            status: 404,
            message: "not found".into()
        }
        .is_aborted());
        assert!(!GraphError::RetriesExhausted {
            attempts: 3,
            last_status: 503
        }
        .is_aborted());
    }

    #[test]
    fn api_error_carries_status_and_body() {
        let err = GraphError::Api {
            status: 403,
            message: "insufficient privileges".into(),
        };
        let text = err.to_string();
        assert!(text.contains("403"));
        assert!(text.contains("insufficient privileges"));
    }
}
