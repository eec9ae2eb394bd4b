#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Tokenization protocol implementations for the payrail checkout SDK.
//!
//! Each payment method family gets one [`payrail::tokenizer::Tokenizer`]
//! implementation, and [`default_registry`] wires the built-in set into a
//! [`MethodRegistry`] keyed by the configuration service's method type
//! strings. The [`resolver::CardNetworkResolver`] drives debounced candidate
//! networks for card entry.
//!
//! # Modules
//!
//! - [`ach`] - ACH bank-debit collection
//! - [`bank`] - Bank-selector redirect methods
//! - [`card`] - Raw card entry
//! - [`external`] - Seams to the host application (web auth, app probes,
//!   processor SDK authorization)
//! - [`oauth`] - OAuth-approval methods (PayPal-style)
//! - [`qr`] - Scan-to-pay QR methods
//! - [`redirect`] - Redirect-based methods
//! - [`resolver`] - Debounced card network resolution
//! - [`session`] - Session-based methods (Klarna-style)
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod ach;
pub mod bank;
pub mod card;
pub mod external;
pub mod oauth;
pub mod qr;
pub mod redirect;
pub mod resolver;
pub mod session;

mod support;

pub use resolver::{BinLookup, CardNetworkResolver};

use std::sync::Arc;

use payrail::config::method_types;
use payrail::tokenizer::MethodRegistry;
use payrail_http::ApiClient;

use crate::external::{AppAvailability, SessionAuthorizer, WebAuthenticator};

/// Builds the registry of built-in payment methods.
///
/// Merchants can register additional factories (or replace built-ins) on the
/// returned registry before handing it to the orchestrator.
#[must_use]
pub fn default_registry(
    client: &ApiClient,
    web: Arc<dyn WebAuthenticator>,
    apps: Arc<dyn AppAvailability>,
    authorizer: Arc<dyn SessionAuthorizer>,
) -> MethodRegistry {
    let mut registry = MethodRegistry::new();

    {
        let client = client.clone();
        registry.register(
            method_types::PAYMENT_CARD,
            Box::new(move |ctx, descriptor, events| {
                Ok(Box::new(card::RawCardTokenizer::new(
                    ctx,
                    client.clone(),
                    descriptor,
                    events,
                )))
            }),
        );
    }

    {
        let client = client.clone();
        let web = Arc::clone(&web);
        let apps = Arc::clone(&apps);
        registry.register(
            method_types::ADYEN_IDEAL,
            Box::new(move |ctx, descriptor, events| {
                Ok(Box::new(bank::BankSelectorTokenizer::new(
                    ctx,
                    client.clone(),
                    descriptor,
                    events,
                    Arc::clone(&web),
                    Arc::clone(&apps),
                )))
            }),
        );
    }

    {
        let client = client.clone();
        let web = Arc::clone(&web);
        let apps = Arc::clone(&apps);
        registry.register(
            method_types::WEB_REDIRECT,
            Box::new(move |ctx, descriptor, events| {
                Ok(Box::new(redirect::RedirectTokenizer::new(
                    ctx,
                    client.clone(),
                    descriptor,
                    events,
                    Arc::clone(&web),
                    Arc::clone(&apps),
                )))
            }),
        );
    }

    {
        let client = client.clone();
        let authorizer = Arc::clone(&authorizer);
        registry.register(
            method_types::KLARNA,
            Box::new(move |ctx, descriptor, events| {
                Ok(Box::new(session::SessionTokenizer::new(
                    ctx,
                    client.clone(),
                    descriptor,
                    events,
                    Arc::clone(&authorizer),
                )))
            }),
        );
    }

    {
        let client = client.clone();
        let web = Arc::clone(&web);
        let apps = Arc::clone(&apps);
        registry.register(
            method_types::PAYPAL,
            Box::new(move |ctx, descriptor, events| {
                Ok(Box::new(oauth::OAuthTokenizer::new(
                    ctx,
                    client.clone(),
                    descriptor,
                    events,
                    Arc::clone(&web),
                    Arc::clone(&apps),
                )))
            }),
        );
    }

    {
        let client = client.clone();
        registry.register(
            method_types::XFERS_PAYNOW,
            Box::new(move |ctx, descriptor, events| {
                Ok(Box::new(qr::QrTokenizer::new(
                    ctx,
                    client.clone(),
                    descriptor,
                    events,
                )))
            }),
        );
    }

    {
        let client = client.clone();
        registry.register(
            method_types::STRIPE_ACH,
            Box::new(move |ctx, descriptor, events| {
                Ok(Box::new(ach::AchTokenizer::new(
                    ctx,
                    client.clone(),
                    descriptor,
                    events,
                )))
            }),
        );
    }

    registry
}
