//! Transport error taxonomy.

use http::StatusCode;
use payrail::error::CheckoutError;

/// Errors that can occur while talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// URL construction failed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// Transport-layer failure (connect, TLS, timeout).
    #[error("HTTP transport error: {context}: {source}")]
    Transport {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status.
    #[error("unexpected HTTP status {status}: {context}: {body}")]
    Status {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },

    /// Response body could not be decoded into the expected type.
    #[error("failed to decode response: {context}: {source}")]
    Decode {
        /// Human-readable context.
        context: &'static str,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The session token does not carry the service URL this call needs.
    #[error("session token is missing a required service URL: {context}")]
    MissingUrl {
        /// Which URL was required.
        context: &'static str,
    },

    /// The session token expired before the request was sent.
    #[error("session token expired at {expired_at}")]
    SessionExpired {
        /// Unix timestamp (seconds) at which the token expired.
        expired_at: u64,
    },
}

impl ApiError {
    /// Returns `true` for transport-layer failures.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` for 5xx responses.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Status { status, .. } if status.is_server_error())
    }
}

impl From<ApiError> for CheckoutError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Decode { .. } => Self::Decode {
                message: err.to_string(),
            },
            ApiError::SessionExpired { expired_at } => Self::TokenExpired { expired_at },
            ApiError::Transport { .. } => Self::Network {
                message: err.to_string(),
                retryable: true,
            },
            ApiError::UrlParse { .. } | ApiError::MissingUrl { .. } => Self::Network {
                message: err.to_string(),
                retryable: false,
            },
            ApiError::Status { ref status, .. } => {
                let retryable = status.is_server_error();
                Self::Network {
                    message: err.to_string(),
                    retryable,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let status = ApiError::Status {
            context: "x",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        assert!(status.is_server_error());
        assert!(!status.is_transport());

        let bad_request = ApiError::Status {
            context: "x",
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(!bad_request.is_server_error());
    }

    #[test]
    fn expired_session_maps_to_token_expired() {
        assert!(matches!(
            CheckoutError::from(ApiError::SessionExpired { expired_at: 42 }),
            CheckoutError::TokenExpired { expired_at: 42 }
        ));
    }

    #[test]
    fn decode_maps_to_decode() {
        let err = serde_json::from_str::<u32>("{}").unwrap_err();
        let mapped = CheckoutError::from(ApiError::Decode {
            context: "body",
            source: err,
        });
        assert!(matches!(mapped, CheckoutError::Decode { .. }));
    }
}
