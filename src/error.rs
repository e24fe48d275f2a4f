//! Typed errors for session and Linear operations
//!
//! Every failure the core can produce maps onto one of four kinds so the
//! dispatch layer can tell a bad setup from a bad call ordering, a rejected
//! token exchange, or a failed remote operation without string matching.

use thiserror::Error;

/// Failure kinds surfaced by the auth session and the operation façade
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinearError {
    /// Missing or contradictory setup parameters. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation invoked in a session state that forbids it.
    ///
    /// The caller must reorder its calls (e.g. finish the OAuth callback
    /// before asking for a client).
    #[error("Invalid session state: {0}")]
    State(String),

    /// The provider rejected an authorization-code or refresh-token exchange,
    /// or the exchange could not reach the provider.
    #[error("Token exchange failed: {0}")]
    AuthExchange(String),

    /// The GraphQL endpoint returned a non-success result or the request
    /// never completed.
    #[error("Linear API error: {0}")]
    RemoteOperation(String),
}

/// Convenience alias used across the core
pub type LinearResult<T> = std::result::Result<T, LinearError>;

impl LinearError {
    /// Convert a non-success HTTP status from the GraphQL endpoint
    pub fn from_http_status(status: reqwest::StatusCode, body: String) -> Self {
        let body = body.trim();
        if body.is_empty() {
            LinearError::RemoteOperation(format!("HTTP {}", status))
        } else {
            LinearError::RemoteOperation(format!("HTTP {}: {}", status, body))
        }
    }

    /// Convert a transport failure talking to the GraphQL endpoint
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LinearError::RemoteOperation(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LinearError::RemoteOperation(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            LinearError::RemoteOperation(format!("Malformed response: {}", e))
        } else {
            LinearError::RemoteOperation(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        let err = LinearError::from_http_status(
            reqwest::StatusCode::BAD_REQUEST,
            "{\"errors\":[]}".to_string(),
        );
        assert_eq!(
            err.to_string(),
            "Linear API error: HTTP 400 Bad Request: {\"errors\":[]}"
        );

        let err = LinearError::from_http_status(reqwest::StatusCode::BAD_GATEWAY, "  ".into());
        assert_eq!(err.to_string(), "Linear API error: HTTP 502 Bad Gateway");
    }

    #[test]
    fn test_error_display() {
        let err = LinearError::AuthExchange("invalid_grant".to_string());
        assert_eq!(err.to_string(), "Token exchange failed: invalid_grant");

        let err = LinearError::State("already authenticated".to_string());
        assert_eq!(err.to_string(), "Invalid session state: already authenticated");
    }

    #[test]
    fn test_convert_to_anyhow() {
        let err: anyhow::Error = LinearError::RemoteOperation("test".to_string()).into();
        assert!(err.to_string().contains("Linear API error"));
    }
}
