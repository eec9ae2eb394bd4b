#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Checkout orchestration for the payrail SDK.
//!
//! The [`orchestrator::CheckoutOrchestrator`] is the state machine driving
//! one checkout session: decode the session token, fetch the method
//! configuration, run the selected tokenization protocol, and land in
//! exactly one terminal state. The [`scope::CheckoutScope`] wraps it in the
//! merchant-facing surface (state stream, terminal callbacks, shutdown).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use payrail_checkout::{CheckoutOrchestrator, CheckoutScope, default_registry};
//! use payrail_http::ApiClient;
//! use payrail_methods::external::NoInstalledApps;
//! # use payrail_methods::external::{WebAuthenticator, SessionAuthorizer};
//! # fn web() -> Arc<dyn WebAuthenticator> { unimplemented!() }
//! # fn authorizer() -> Arc<dyn SessionAuthorizer> { unimplemented!() }
//!
//! # async fn run(compact_token: &str) -> Result<(), payrail::error::CheckoutError> {
//! let token = payrail::session::DecodedSessionToken::decode(compact_token)?;
//! let client = ApiClient::new(Arc::new(token.clone()));
//! let registry = default_registry(&client, web(), Arc::new(NoInstalledApps), authorizer());
//! let ctx = Arc::new(payrail::context::SessionContext::new(token));
//! let orchestrator = Arc::new(CheckoutOrchestrator::new(ctx, registry).with_client(client));
//! let scope = CheckoutScope::open(Arc::clone(&orchestrator));
//! scope.on_success(|payment_id| println!("paid: {payment_id}"));
//!
//! let methods = orchestrator.initialize().await?;
//! orchestrator.select_method(&methods[0]).await?;
//! orchestrator.submit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod orchestrator;
pub mod scope;

pub use orchestrator::{CheckoutOrchestrator, CheckoutState};
pub use payrail_methods::default_registry;
pub use scope::CheckoutScope;
