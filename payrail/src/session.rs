//! Client-session token decoding.
//!
//! A checkout session starts from an opaque, JWT-like compact token handed to
//! the SDK by the merchant backend. The payload segment is base64url-encoded
//! JSON carrying the access credential, the session intent, and the service
//! URLs used for every subsequent backend call. The token is decoded locally;
//! no network access is involved.
//!
//! A decoded token is replaced wholesale on session refresh and never mutated
//! in place. A token whose expiry has passed must never authorize a network
//! call; callers gate on [`DecodedSessionToken::ensure_usable`].

use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::{CheckoutError, InvalidTokenError};

/// What the session is allowed to do with a tokenized payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionIntent {
    /// Tokenize and pay in one session.
    Checkout,
    /// Tokenize and store for later use; no payment is created.
    Vault,
}

/// Unix-seconds expiry timestamp.
///
/// Serialized tolerantly: backends emit both raw integers and stringified
/// integers, so both are accepted on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expiry(u64);

impl Expiry {
    /// Creates an expiry from raw Unix seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the expiry as raw Unix seconds.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(secs) => Ok(Self(secs)),
            Raw::Str(s) => s
                .parse::<u64>()
                .map(Self)
                .map_err(|_| serde::de::Error::custom("expiry must be a non-negative integer")),
        }
    }
}

/// Returns the current system time as Unix seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("SystemTime before UNIX epoch?!?")
        .as_secs()
}

/// A client-session token decoded into its typed fields.
///
/// Created once at session start by [`DecodedSessionToken::decode`]; replaced
/// wholesale on session refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedSessionToken {
    /// The access credential sent with every backend request.
    pub access_token: String,

    /// Expiry timestamp (Unix seconds).
    pub exp: Expiry,

    /// Session intent. Defaults to checkout when the backend omits it.
    #[serde(default = "default_intent")]
    pub intent: SessionIntent,

    /// Configuration service URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_url: Option<Url>,

    /// Core API URL (payments, sessions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_url: Option<Url>,

    /// PCI proxy URL (tokenization).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pci_url: Option<Url>,

    /// BIN data service URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindata_url: Option<Url>,

    /// 3DS initialization URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub three_ds_init_url: Option<Url>,

    /// Status-poll URL for asynchronous payment flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_url: Option<Url>,

    /// Redirect URL for external web authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<Url>,

    /// QR payload for scan-to-pay methods (base64 image or raw string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,

    /// Voucher reference for over-the-counter methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_reference: Option<String>,

    /// Voucher expiry (Unix seconds) for over-the-counter methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_expires_at: Option<Expiry>,

    /// ACH client secret for bank-debit completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_client_secret: Option<String>,
}

const fn default_intent() -> SessionIntent {
    SessionIntent::Checkout
}

impl DecodedSessionToken {
    /// Decodes a compact client-session token.
    ///
    /// Scans the dot-separated segments for the base64url-encoded JSON
    /// payload carrying `accessToken`. This mirrors the backend's token
    /// shape, which places the payload second but is not guaranteed to.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidToken`] when no segment decodes into a
    /// payload with an access token.
    pub fn decode(compact: &str) -> Result<Self, CheckoutError> {
        let trimmed = compact.trim();
        if trimmed.is_empty() {
            return Err(InvalidTokenError::new("empty-token").into());
        }

        for segment in trimmed.split('.') {
            let Ok(bytes) = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')) else {
                continue;
            };
            let Ok(token) = serde_json::from_slice::<Self>(&bytes) else {
                continue;
            };
            if !token.access_token.is_empty() {
                #[cfg(feature = "telemetry")]
                tracing::debug!(intent = ?token.intent, exp = token.exp.as_secs(), "session token decoded");
                return Ok(token);
            }
        }

        Err(InvalidTokenError::new("missing-access-token")
            .with_message("no token segment decoded into a session payload")
            .into())
    }

    /// Returns `true` when the token expiry is at or before `now`.
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        self.exp.as_secs() <= now
    }

    /// Gates network use of this token on its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::TokenExpired`] when the expiry has passed.
    pub const fn ensure_usable(&self, now: u64) -> Result<(), CheckoutError> {
        if self.is_expired(now) {
            return Err(CheckoutError::TokenExpired {
                expired_at: self.exp.as_secs(),
            });
        }
        Ok(())
    }
}
