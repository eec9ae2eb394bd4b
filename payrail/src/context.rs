//! Per-session shared context.
//!
//! [`SessionContext`] carries the decoded session token and, once fetched,
//! the payment method configuration. It is constructed once per checkout
//! session and passed by reference to every component that needs it; there
//! is no global session state. Only the orchestrator replaces the
//! configuration, and always wholesale.

use std::sync::{Arc, RwLock};

use crate::config::PaymentMethodConfig;
use crate::session::{DecodedSessionToken, SessionIntent};

/// Shared, read-mostly state for one checkout session.
#[derive(Debug)]
pub struct SessionContext {
    token: Arc<DecodedSessionToken>,
    config: RwLock<Option<Arc<PaymentMethodConfig>>>,
}

impl SessionContext {
    /// Creates a context from a freshly decoded session token.
    #[must_use]
    pub fn new(token: DecodedSessionToken) -> Self {
        Self {
            token: Arc::new(token),
            config: RwLock::new(None),
        }
    }

    /// The decoded session token.
    #[must_use]
    pub fn token(&self) -> &Arc<DecodedSessionToken> {
        &self.token
    }

    /// The session intent from the token.
    #[must_use]
    pub fn intent(&self) -> SessionIntent {
        self.token.intent
    }

    /// The payment method configuration, when the fetch has completed.
    #[must_use]
    pub fn config(&self) -> Option<Arc<PaymentMethodConfig>> {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Replaces the configuration wholesale after a (re)fetch.
    pub fn set_config(&self, config: PaymentMethodConfig) {
        *self.config.write().expect("config lock poisoned") = Some(Arc::new(config));
    }
}
