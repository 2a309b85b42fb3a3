//! Errors raised while talking to the agent server.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// Build a status error from a non-2xx response body.
    ///
    /// The server reports failures as `{"detail": "..."}`; anything else is
    /// passed through verbatim.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| match v.get("detail") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            })
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    "no response body".to_string()
                } else {
                    body.trim().to_string()
                }
            });
        Self::Status { status, message }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_prefers_detail() {
        let err = ClientError::from_status(404, r#"{"detail":"Agent agent-1 not found"}"#);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "HTTP 404: Agent agent-1 not found");
    }

    #[test]
    fn test_from_status_structured_detail() {
        let err = ClientError::from_status(422, r#"{"detail":[{"loc":["body","name"]}]}"#);
        assert!(err.to_string().starts_with("HTTP 422: [{"));
    }

    #[test]
    fn test_from_status_plain_body() {
        let err = ClientError::from_status(502, "  bad gateway ");
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");

        let err = ClientError::from_status(500, "");
        assert_eq!(err.to_string(), "HTTP 500: no response body");
    }
}
