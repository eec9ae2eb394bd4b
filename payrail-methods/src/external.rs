//! Seams to the host application.
//!
//! Redirect methods hand the user off to a browser or native app and get
//! them back via a return URL; session methods authorize through a processor
//! SDK the host embeds. Both boundaries are traits so the protocol chains
//! stay testable without a device.

use async_trait::async_trait;
use payrail::error::CheckoutError;
use url::Url;

/// How an external authentication URL should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChannel {
    /// The provider's native app is installed; deep-link into it.
    NativeApp,
    /// Open an in-app browser or custom tab.
    Browser,
}

/// Drives an external web authentication round trip.
#[async_trait]
pub trait WebAuthenticator: Send + Sync {
    /// Opens `url` on the given channel and resolves once the user returns
    /// to the app (or errs when they abandon the flow).
    async fn authenticate(&self, url: &Url, channel: AuthChannel) -> Result<(), CheckoutError>;
}

/// Probes whether a provider's native app can handle a URL scheme.
///
/// Queried fresh on every payment attempt; the answer is never cached, so an
/// app installed mid-session is picked up on the next attempt.
#[async_trait]
pub trait AppAvailability: Send + Sync {
    /// Returns `true` when an installed app handles `scheme`.
    async fn can_open(&self, scheme: &str) -> bool;
}

/// An [`AppAvailability`] that always answers no; every redirect goes
/// through the browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstalledApps;

#[async_trait]
impl AppAvailability for NoInstalledApps {
    async fn can_open(&self, _scheme: &str) -> bool {
        false
    }
}

/// Result of a processor-side authorization step.
#[derive(Debug, Clone)]
pub struct AuthorizationResult {
    /// Processor authorization token.
    pub auth_token: String,
    /// Whether a finalize round trip is required before tokenizing.
    pub finalize_required: bool,
}

/// Authorizes a session-based payment through the processor SDK embedded in
/// the host application.
#[async_trait]
pub trait SessionAuthorizer: Send + Sync {
    /// Runs the processor authorization for a selected payment category.
    async fn authorize(
        &self,
        processor_client_token: &str,
        category_identifier: &str,
    ) -> Result<AuthorizationResult, CheckoutError>;
}
