//! Method registry: maps payment method type keys to tokenizer factories.
//!
//! The registry is populated at startup/configuration time and is immutable
//! for the duration of an active session; the orchestrator only reads it.
//! This replaces runtime type lookup keyed by string identifiers with an
//! explicit factory table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::PaymentMethodDescriptor;
use crate::context::SessionContext;
use crate::error::{CheckoutError, MethodUnavailableError};

use super::{EventSink, Tokenizer};

/// Factory producing a tokenizer for one payment method attempt.
pub type MethodFactory = Box<
    dyn Fn(
            Arc<SessionContext>,
            &PaymentMethodDescriptor,
            EventSink,
        ) -> Result<Box<dyn Tokenizer>, CheckoutError>
        + Send
        + Sync,
>;

/// Registry of tokenizer factories keyed by method type.
#[derive(Default)]
pub struct MethodRegistry(HashMap<String, MethodFactory>);

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();
        f.debug_tuple("MethodRegistry").field(&keys).finish()
    }
}

impl MethodRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Registers a factory for a method type key, replacing any previous one.
    pub fn register(&mut self, method_type: impl Into<String>, factory: MethodFactory) -> &mut Self {
        self.0.insert(method_type.into(), factory);
        self
    }

    /// Returns `true` when a factory exists for the method type.
    #[must_use]
    pub fn supports(&self, method_type: &str) -> bool {
        self.0.contains_key(method_type)
    }

    /// Returns the registered method type keys, sorted.
    #[must_use]
    pub fn method_types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Builds a tokenizer for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::MethodUnavailable`] when no factory is
    /// registered for the descriptor's method type.
    pub fn resolve(
        &self,
        ctx: Arc<SessionContext>,
        descriptor: &PaymentMethodDescriptor,
        events: EventSink,
    ) -> Result<Box<dyn Tokenizer>, CheckoutError> {
        let factory = self
            .0
            .get(&descriptor.method_type)
            .ok_or_else(|| MethodUnavailableError::new(&descriptor.method_type))?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(method_type = %descriptor.method_type, "building tokenizer");
        factory(ctx, descriptor, events)
    }
}
