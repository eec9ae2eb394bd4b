#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the payrail checkout orchestration SDK.
//!
//! This crate provides the foundational types used throughout the payrail
//! ecosystem for collecting payment details, tokenizing them against a
//! backend, and driving a multi-step checkout to a single terminal outcome.
//! It is transport-agnostic; the HTTP layer lives in `payrail-http` and the
//! concrete payment-method flows in `payrail-methods`.
//!
//! # Overview
//!
//! A checkout session starts from an opaque client-session token. The token
//! is decoded locally into a [`session::DecodedSessionToken`] carrying the
//! session intent and the backend service URLs. A configuration fetch then
//! yields the ordered set of available payment methods
//! ([`config::PaymentMethodConfig`]). Each method is driven by a
//! [`tokenizer::Tokenizer`] implementation resolved through the
//! [`tokenizer::MethodRegistry`], and the orchestrator in `payrail-checkout`
//! reconciles the attempt into success, failure, or dismissal.
//!
//! # Modules
//!
//! - [`cardnet`] - Card network identification and the local BIN table
//! - [`config`] - Payment method configuration and retry policy
//! - [`context`] - Per-session shared context
//! - [`error`] - Error taxonomy for the whole SDK
//! - [`hooks`] - Merchant-facing checkout lifecycle hooks
//! - [`session`] - Client-session token decoding
//! - [`tokenizer`] - Tokenization protocol trait and method registry
//! - [`validate`] - Pure, per-field validation rules
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod cardnet;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod session;
pub mod tokenizer;
pub mod validate;
