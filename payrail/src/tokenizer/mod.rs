//! Tokenization protocol trait and supporting types.
//!
//! Every payment method family is driven by one [`Tokenizer`] implementation
//! covering the capability set start / collect-input / submit / resume /
//! cancel. The orchestrator resolves the implementation through the
//! [`MethodRegistry`] and owns the resulting [`PaymentOutcome`]; tokenizers
//! hold only transient per-attempt state.
//!
//! User-visible intermediate steps (a redirect URL to open, a QR code to
//! show, a category or bank list to pick from) are pushed through a
//! [`MethodEvent`] broadcast channel rather than delegate callbacks, so the
//! UI layer never calls back into protocol internals.

mod registry;

pub use registry::*;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cardnet::CardNetwork;
use crate::error::CheckoutError;

/// Boxed future used by dyn-compatible protocol traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Broadcast sink for intermediate protocol events.
pub type EventSink = tokio::sync::broadcast::Sender<MethodEvent>;

/// An input field a tokenizer can collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputField {
    /// Card PAN.
    CardNumber,
    /// Card expiry, `MM/YY` or `MM/YYYY`.
    ExpiryDate,
    /// Card security code.
    Cvv,
    /// Name as printed on the card.
    CardholderName,
    /// Billing postal code.
    PostalCode,
    /// Billing country code.
    CountryCode,
    /// Account holder first name.
    FirstName,
    /// Account holder last name.
    LastName,
    /// Account holder email address.
    EmailAddress,
}

/// A user selection made during a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A bank picked from a bank-selector list.
    Bank(String),
    /// A payment category picked from a session-based method.
    Category(String),
    /// An explicit network choice for a co-badged card.
    Network(CardNetwork),
}

/// A selectable payment category returned by session-based methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCategory {
    /// Category identifier submitted on authorize.
    pub identifier: String,
    /// Display name.
    pub name: String,
}

/// A bank entry returned by bank-selector methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankItem {
    /// Bank identifier submitted on tokenize.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Bank logo URL, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<Url>,
}

/// Intermediate event pushed from a protocol to the UI boundary.
#[derive(Debug, Clone)]
pub enum MethodEvent {
    /// Open this URL for external web authentication.
    RedirectRequested {
        /// The authentication URL.
        url: Url,
    },
    /// Show this QR payload to the user.
    QrCodeReady {
        /// Base64 image data or raw QR string.
        payload: String,
    },
    /// Present these categories for selection.
    CategoriesLoaded(Vec<PaymentCategory>),
    /// Present these banks for selection.
    BanksLoaded(Vec<BankItem>),
    /// The candidate card networks changed.
    CardNetworksResolved(Vec<CardNetwork>),
    /// A bank-debit mandate must be confirmed with this processor secret.
    MandateReady {
        /// Processor-side client secret for the mandate step.
        client_secret: String,
    },
}

/// Terminal-or-intermediate status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// The payment settled or was authorized.
    Success,
    /// The backend reported a terminal failure.
    Failed,
    /// The payment needs a resume step to continue.
    Pending,
}

/// Outcome of a tokenization/payment round trip.
///
/// Produced by a tokenizer when its network chain completes; consumed once
/// by the orchestrator to decide the next transition; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// Backend payment identifier.
    pub payment_id: String,
    /// Attempt status.
    pub status: PaymentStatus,
    /// Status URL to poll when the payment is pending.
    pub resume_url: Option<Url>,
}

impl PaymentOutcome {
    /// A successful outcome.
    #[must_use]
    pub const fn success(payment_id: String) -> Self {
        Self {
            payment_id,
            status: PaymentStatus::Success,
            resume_url: None,
        }
    }
}

/// A payment-method tokenization protocol.
///
/// Implementations convert method-specific inputs into a backend token and
/// payment result. They may keep per-attempt buffers and poll loops but no
/// cross-attempt state. `cancel` is idempotent, safe with nothing in flight,
/// and guarantees that no event or outcome is delivered afterwards.
pub trait Tokenizer: Send + Sync {
    /// The method type key this instance serves.
    fn method_type(&self) -> &str;

    /// Performs method-specific setup (fetch bank lists, create sessions)
    /// and pushes any resulting [`MethodEvent`].
    fn start(&self) -> BoxFuture<'_, Result<(), CheckoutError>>;

    /// Buffers one field update.
    ///
    /// # Errors
    ///
    /// Returns an error when the field is not collected by this method.
    fn update_field(&self, field: InputField, value: &str) -> Result<(), CheckoutError>;

    /// Records a user selection (bank, category, co-badged network).
    ///
    /// # Errors
    ///
    /// Returns an error when the selection is not applicable to this method.
    fn select(&self, selection: Selection) -> Result<(), CheckoutError>;

    /// Drives the collected inputs through tokenization and payment to an
    /// outcome.
    fn submit(&self) -> BoxFuture<'_, Result<PaymentOutcome, CheckoutError>>;

    /// Advances a pending payment with a resume token.
    fn resume(&self, resume_token: &str) -> BoxFuture<'_, Result<PaymentOutcome, CheckoutError>>;

    /// Cancels the attempt. Idempotent; effective mid-poll.
    fn cancel(&self);
}
