//! Request Engine Library
//!
//! A configuration-driven HTTP request engine: given a declarative description
//! of an endpoint, its authentication and its body, it executes one or more
//! HTTP calls, interprets responses by content type, keeps pagination state
//! across invocations, classifies failures, and moves binary payloads through
//! an external object store.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Declarative request configuration and validation
//! - [`auth`] - Credential resolution across competing schemes
//! - [`request`] - URL, header and body construction
//! - [`transport`] - reqwest client honouring timeout, redirect and TLS options
//! - [`response`] - Content-type driven response interpretation
//! - [`attachment`] - Attachment store seam and HTTP implementation with retries
//! - [`classify`] - Rebound / soft-fail / hard-fail classification
//! - [`pagination`] - Snapshot store and pagination loop
//! - [`rate_limit`] - Spacing between emissions
//! - [`engine`] - Orchestration entry point
//!
//! Collaborators are injected as trait objects: [`Evaluator`] for
//! expressions, [`Emitter`] for results and [`AttachmentStore`] for binary
//! content.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attachment;
pub mod auth;
pub mod classify;
pub mod config;
pub mod constants;
pub mod emit;
pub mod engine;
pub mod error;
pub mod expression;
pub mod message;
pub mod pagination;
pub mod rate_limit;
pub mod request;
pub mod response;
pub mod transport;

// Re-export commonly used types
pub use attachment::{
    AttachmentError, AttachmentSettings, AttachmentStore, HttpAttachmentStore, StoredObject,
};
pub use auth::{AuthConfig, ResolvedAuth, resolve_auth};
pub use classify::{ClassifierSettings, ErrorDisposition, SoftFailure, classify};
pub use config::{IntLike, RequestConfig, ResponseType};
pub use emit::{EmitError, Emission, Emitter, ErrorReport};
pub use engine::RequestEngine;
pub use error::{AttemptError, ConfigError, EngineError};
pub use expression::{EvalError, Evaluator, PathEvaluator};
pub use message::{Attachment, Message};
pub use pagination::{SnapshotStore, get_message_snapshot, initial_snapshot};
pub use rate_limit::RateLimitPlan;
pub use request::{BuildOutcome, Method, PreparedRequest, encode_www_form_param};
