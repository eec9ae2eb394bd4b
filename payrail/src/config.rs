//! Payment method configuration and retry policy.
//!
//! [`PaymentMethodConfig`] is the ordered set of payment methods available to
//! a session, produced once by the configuration fetch and read-only
//! afterward. [`RetryConfig`] is the declarative retry policy attached to the
//! HTTP client for the lifetime of a request pipeline.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Well-known payment method type keys.
///
/// These are the wire identifiers the configuration service uses; the method
/// registry is keyed by the same strings so merchants can register custom
/// types alongside the built-in ones.
pub mod method_types {
    /// Raw card entry.
    pub const PAYMENT_CARD: &str = "PAYMENT_CARD";
    /// iDEAL bank redirect via Adyen.
    pub const ADYEN_IDEAL: &str = "ADYEN_IDEAL";
    /// Generic web redirect.
    pub const WEB_REDIRECT: &str = "WEB_REDIRECT";
    /// Klarna session-based payments.
    pub const KLARNA: &str = "KLARNA";
    /// PayPal order / billing-agreement payments.
    pub const PAYPAL: &str = "PAYPAL";
    /// PayNow scan-to-pay QR payments.
    pub const XFERS_PAYNOW: &str = "XFERS_PAYNOW";
    /// ACH bank debit via Stripe.
    pub const STRIPE_ACH: &str = "STRIPE_ACH";
}

/// One available payment method as described by the configuration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodDescriptor {
    /// Per-method configuration id, referenced when tokenizing.
    pub id: String,

    /// Method type key (e.g., `"PAYMENT_CARD"`, `"ADYEN_IDEAL"`).
    #[serde(rename = "type")]
    pub method_type: String,

    /// Display name shown in the method list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Processor configuration id, when the method routes through a
    /// third-party processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_config_id: Option<String>,

    /// Per-network surcharges in minor units, present for card methods with
    /// network-specific pricing.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub network_surcharges: HashMap<String, i64>,
}

/// Order totals attached to a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    /// Total amount in minor units.
    pub amount: i64,
    /// ISO 4217 currency code.
    pub currency_code: String,
}

/// Ordered collection of the payment methods available to a session.
///
/// Created once after the configuration fetch; invalidated and refetched
/// only on a session token change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodConfig {
    /// Available methods in backend-provided display order.
    pub payment_methods: Vec<PaymentMethodDescriptor>,

    /// Order totals, present for checkout sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSummary>,
}

impl PaymentMethodConfig {
    /// Creates a configuration from an ordered descriptor list.
    #[must_use]
    pub const fn new(payment_methods: Vec<PaymentMethodDescriptor>) -> Self {
        Self {
            payment_methods,
            order: None,
        }
    }

    /// Attaches order totals.
    #[must_use]
    pub fn with_order(mut self, order: OrderSummary) -> Self {
        self.order = Some(order);
        self
    }

    /// Looks up the first descriptor with the given method type key.
    #[must_use]
    pub fn descriptor(&self, method_type: &str) -> Option<&PaymentMethodDescriptor> {
        self.payment_methods
            .iter()
            .find(|m| m.method_type == method_type)
    }

    /// Returns the method type keys in display order.
    #[must_use]
    pub fn method_types(&self) -> Vec<&str> {
        self.payment_methods
            .iter()
            .map(|m| m.method_type.as_str())
            .collect()
    }
}

/// Declarative retry policy for backend requests.
///
/// Immutable once constructed. The HTTP layer honors it as follows:
/// transport errors are retried only if [`RetryConfig::retry_network_errors`],
/// 5xx responses only if [`RetryConfig::retry_500_errors`], and backoff is
/// exponential from [`RetryConfig::initial_backoff`] with uniform jitter
/// bounded by [`RetryConfig::max_jitter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Master switch; when `false` every failure is terminal on first try.
    pub enabled: bool,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base backoff applied before the first retry.
    pub initial_backoff: Duration,
    /// Whether transport-layer errors are retryable.
    pub retry_network_errors: bool,
    /// Whether HTTP 5xx responses are retryable.
    pub retry_500_errors: bool,
    /// Upper bound on the random jitter added to each backoff.
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 8,
            initial_backoff: Duration::from_millis(100),
            retry_network_errors: true,
            retry_500_errors: false,
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            retry_network_errors: false,
            retry_500_errors: false,
            max_jitter: Duration::ZERO,
        }
    }
}
