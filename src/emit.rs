//! Emission channel used to hand results back to the caller.
//!
//! Every logical attempt produces exactly one of [`Emission::Data`],
//! [`Emission::Error`] or [`Emission::Rebound`], eventually followed by
//! [`Emission::End`]. [`Emission::Snapshot`] may appear any number of times
//! before `End` while paginating. The engine awaits each `emit` before issuing
//! the next one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;
use crate::pagination::SnapshotStore;

/// Error details surfaced through [`Emission::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// User-facing message.
    pub message: String,
    /// HTTP status, when the failure carried a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// A signal handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Emission {
    /// A result message (including soft-failed attempts).
    Data(Message),
    /// A terminal failure.
    Error(ErrorReport),
    /// The attempt should be retried by the invoking scheduler.
    Rebound(String),
    /// Persisted pagination state.
    Snapshot(SnapshotStore),
    /// Completion signal.
    End,
}

impl Emission {
    /// Short name of the emission kind, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Error(_) => "error",
            Self::Rebound(_) => "rebound",
            Self::Snapshot(_) => "snapshot",
            Self::End => "end",
        }
    }
}

/// The receiving channel rejected an emission.
#[derive(Debug, Error)]
#[error("emission channel rejected {kind}: {message}")]
pub struct EmitError {
    /// Kind of the rejected emission.
    pub kind: &'static str,
    /// Reason given by the channel.
    pub message: String,
}

impl EmitError {
    /// Creates an emission error.
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Receives emissions from the engine.
///
/// Implementations may reject overlapping emissions; the engine never issues
/// one before the previous `emit` future has completed.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Delivers one emission.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError`] when the channel cannot accept the emission.
    async fn emit(&self, emission: Emission) -> Result<(), EmitError>;
}
