//! Merchant-facing checkout lifecycle hooks.
//!
//! Hooks let the merchant intercept the checkout flow at defined points.
//! The decisive one is [`CheckoutHooks::before_payment_create`], consulted
//! by the orchestrator immediately before tokenization for checkout-intent
//! sessions: an abort decision short-circuits the attempt with the
//! merchant-supplied message before any tokenization call is made. Vault
//! intent never consults it.
//!
//! All methods have default no-op implementations; implement only what you
//! need. When several hooks are registered the first abort wins.

use crate::error::CheckoutError;
use crate::session::SessionIntent;
use crate::tokenizer::{BoxFuture, PaymentOutcome};

/// Decision returned by [`CheckoutHooks::before_payment_create`].
#[derive(Debug, Clone)]
pub enum HookDecision {
    /// Allow the attempt to proceed.
    Continue,
    /// Veto the attempt with a merchant-supplied message.
    Abort {
        /// Message surfaced verbatim in the failure state.
        message: String,
    },
}

/// Context passed to payment-creation hooks.
#[derive(Debug, Clone)]
pub struct PaymentCreateContext {
    /// The payment method type being attempted.
    pub method_type: String,
    /// The session intent.
    pub intent: SessionIntent,
}

/// Lifecycle hooks around a checkout attempt.
pub trait CheckoutHooks: Send + Sync {
    /// Called before tokenization for checkout-intent attempts.
    ///
    /// Returning [`HookDecision::Abort`] fails the attempt with the given
    /// message and skips tokenization entirely.
    fn before_payment_create<'a>(
        &'a self,
        _ctx: &'a PaymentCreateContext,
    ) -> BoxFuture<'a, HookDecision> {
        Box::pin(async { HookDecision::Continue })
    }

    /// Called after a payment attempt reaches a successful outcome.
    fn on_payment_created<'a>(
        &'a self,
        _ctx: &'a PaymentCreateContext,
        _outcome: &'a PaymentOutcome,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Called when a payment attempt fails. Observational only.
    fn on_failure<'a>(
        &'a self,
        _ctx: &'a PaymentCreateContext,
        _error: &'a CheckoutError,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Vetoing;

    impl CheckoutHooks for Vetoing {
        fn before_payment_create<'a>(
            &'a self,
            _ctx: &'a PaymentCreateContext,
        ) -> BoxFuture<'a, HookDecision> {
            Box::pin(async {
                HookDecision::Abort {
                    message: "Payment aborted by merchant".into(),
                }
            })
        }
    }

    struct Permissive;

    impl CheckoutHooks for Permissive {}

    #[tokio::test]
    async fn default_hook_continues() {
        let ctx = PaymentCreateContext {
            method_type: "PAYMENT_CARD".into(),
            intent: SessionIntent::Checkout,
        };
        assert!(matches!(
            Permissive.before_payment_create(&ctx).await,
            HookDecision::Continue
        ));
    }

    #[tokio::test]
    async fn abort_carries_the_merchant_message() {
        let ctx = PaymentCreateContext {
            method_type: "PAYMENT_CARD".into(),
            intent: SessionIntent::Checkout,
        };
        match Vetoing.before_payment_create(&ctx).await {
            HookDecision::Abort { message } => {
                assert_eq!(message, "Payment aborted by merchant");
            }
            HookDecision::Continue => panic!("expected abort"),
        }
    }
}
