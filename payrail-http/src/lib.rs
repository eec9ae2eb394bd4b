#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for the payrail checkout SDK.
//!
//! This crate provides the typed JSON [`client::ApiClient`] used by every
//! tokenization protocol and by the orchestrator. Requests carry the session
//! access token, honor the declarative [`payrail::config::RetryConfig`]
//! policy, and never retry decode failures.
//!
//! # Modules
//!
//! - [`api`] - Concrete backend endpoints (configuration, BIN lookup,
//!   tokenize, create/resume payment, method-specific sessions)
//! - [`client`] - Generic typed request/response client
//! - [`error`] - Transport error taxonomy
//! - [`poll`] - Cancellable status poller for asynchronous payment flows
//! - [`retry`] - Backoff/jitter execution of the retry policy
//! - [`types`] - Wire request/response shapes
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod api;
pub mod client;
pub mod error;
pub mod poll;
pub mod retry;
pub mod types;

pub use client::{ApiClient, Endpoint};
pub use error::ApiError;
pub use poll::StatusPoller;
