//! Error types for the payrail checkout SDK.
//!
//! Every error class that can end a checkout attempt carries a stable
//! machine-readable code, a diagnostics identifier for support lookups, and a
//! human-readable message. Validation errors are the exception: they stay
//! field-scoped and never escalate to a terminal checkout state.

use std::fmt;

/// Base error type for checkout operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// The client-session token could not be decoded.
    #[error("{0}")]
    InvalidToken(#[from] InvalidTokenError),

    /// The client-session token has expired and must not authorize calls.
    #[error("client session token expired at {expired_at}")]
    TokenExpired {
        /// Unix seconds at which the token expired.
        expired_at: u64,
    },

    /// The configuration fetch failed; the session cannot proceed.
    #[error("configuration fetch failed: {0}")]
    ConfigurationFetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A network or transport failure after exhausting any configured retries.
    #[error("network failure: {message}")]
    Network {
        /// Human-readable description of the transport failure.
        message: String,
        /// Whether the failure class was eligible for retry.
        retryable: bool,
    },

    /// The backend response could not be decoded. Never retried.
    #[error("decode failure: {message}")]
    Decode {
        /// Human-readable description of the decode failure.
        message: String,
    },

    /// A collected input failed validation on submit, or a field/selection
    /// was sent to a method that does not collect it.
    #[error("invalid input for {field}: {code}")]
    InvalidInput {
        /// The field or selection that was rejected.
        field: String,
        /// Stable validation error code.
        code: String,
    },

    /// A merchant hook vetoed the payment before tokenization.
    #[error("{0}")]
    MerchantAborted(#[from] MerchantAbortedError),

    /// The user cancelled the attempt. Not a failure.
    #[error("cancelled by user")]
    UserCancelled,

    /// No tokenizer is registered for the requested payment method type.
    #[error("{0}")]
    MethodUnavailable(#[from] MethodUnavailableError),

    /// The backend reported a terminal payment failure.
    #[error("{0}")]
    PaymentFailed(#[from] PaymentFailedError),

    /// Status polling exceeded its attempt bound without reaching a
    /// terminal state.
    #[error("status polling timed out after {attempts} attempts")]
    PollTimedOut {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

impl CheckoutError {
    /// Returns the stable machine-readable code for this error class.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken(_) => "invalid-client-token",
            Self::TokenExpired { .. } => "expired-client-token",
            Self::ConfigurationFetch(_) => "configuration-fetch-failed",
            Self::Network { .. } => "network-error",
            Self::Decode { .. } => "decode-error",
            Self::InvalidInput { .. } => "invalid-input",
            Self::MerchantAborted(_) => "merchant-aborted",
            Self::UserCancelled => "cancelled",
            Self::MethodUnavailable(_) => "unsupported-payment-method",
            Self::PaymentFailed(_) => "payment-failed",
            Self::PollTimedOut { .. } => "poll-timed-out",
        }
    }

    /// Returns `true` for the user-cancellation outcome, which is a normal
    /// terminal state rather than a failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }
}

/// The client-session token could not be decoded into a usable session.
#[derive(Debug, Clone)]
pub struct InvalidTokenError {
    /// Machine-readable reason (e.g., `"missing-access-token"`).
    pub reason: String,
    /// Optional human-readable detail.
    pub message: Option<String>,
}

impl InvalidTokenError {
    /// Creates a new invalid-token error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for InvalidTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "invalid client token ({}): {msg}", self.reason),
            None => write!(f, "invalid client token ({})", self.reason),
        }
    }
}

impl std::error::Error for InvalidTokenError {}

/// A merchant "will create payment" hook vetoed the attempt.
///
/// The message is merchant-supplied and surfaced verbatim.
#[derive(Debug, Clone)]
pub struct MerchantAbortedError {
    /// The merchant-supplied abort message.
    pub message: String,
}

impl MerchantAbortedError {
    /// Creates a new merchant-aborted error carrying the merchant's message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for MerchantAbortedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MerchantAbortedError {}

/// No tokenizer is registered for a payment method type.
#[derive(Debug, Clone)]
pub struct MethodUnavailableError {
    /// The requested payment method type key.
    pub method_type: String,
}

impl MethodUnavailableError {
    /// Creates a new method-unavailable error.
    #[must_use]
    pub fn new(method_type: impl Into<String>) -> Self {
        Self {
            method_type: method_type.into(),
        }
    }
}

impl fmt::Display for MethodUnavailableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no tokenizer registered for payment method '{}'",
            self.method_type
        )
    }
}

impl std::error::Error for MethodUnavailableError {}

/// The backend reported a terminal payment failure.
#[derive(Debug, Clone)]
pub struct PaymentFailedError {
    /// Backend payment identifier, if one was assigned.
    pub payment_id: Option<String>,
    /// Machine-readable failure reason.
    pub reason: String,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Diagnostics identifier for support lookups.
    pub diagnostics_id: Option<String>,
}

impl PaymentFailedError {
    /// Creates a new payment-failed error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            payment_id: None,
            reason: reason.into(),
            message: None,
            diagnostics_id: None,
        }
    }

    /// Sets the backend payment identifier.
    #[must_use]
    pub fn with_payment_id(mut self, id: impl Into<String>) -> Self {
        self.payment_id = Some(id.into());
        self
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the diagnostics identifier.
    #[must_use]
    pub fn with_diagnostics_id(mut self, id: impl Into<String>) -> Self {
        self.diagnostics_id = Some(id.into());
        self
    }
}

impl fmt::Display for PaymentFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "payment failed ({}): {msg}", self.reason),
            None => write!(f, "payment failed ({})", self.reason),
        }
    }
}

impl std::error::Error for PaymentFailedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            CheckoutError::TokenExpired { expired_at: 0 }.code(),
            "expired-client-token"
        );
        assert_eq!(CheckoutError::UserCancelled.code(), "cancelled");
        assert_eq!(
            CheckoutError::from(MerchantAbortedError::new("no")).code(),
            "merchant-aborted"
        );
    }

    #[test]
    fn cancellation_is_not_a_failure() {
        assert!(CheckoutError::UserCancelled.is_cancellation());
        assert!(!CheckoutError::PollTimedOut { attempts: 3 }.is_cancellation());
    }

    #[test]
    fn merchant_abort_message_surfaces_verbatim() {
        let err = CheckoutError::from(MerchantAbortedError::new("Payment aborted by merchant"));
        assert_eq!(err.to_string(), "Payment aborted by merchant");
    }
}
