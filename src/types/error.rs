//! Error types for the resumable state engine.
//!
//! Per-value failures during lazy deserialization stay local to the value
//! being resolved; a failure during the serialization walk aborts the whole
//! pass, because every slot index in the output is load-bearing and a
//! partial list is not a valid prefix of anything.

use thiserror::Error;

use crate::types::value::ValueHandle;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error taxonomy
#[derive(Error, Debug)]
pub enum Error {
    /// A path was requested for a value that was never registered with the
    /// serialization pass. This is a structural bug in the caller: a
    /// reference escaped the walked graph.
    #[error("no root id: value {0:?} was never seen by the serialization pass")]
    MissingRootId(ValueHandle),

    /// A decoded reference points past the end of the slot list. Raised at
    /// the point of access; unrelated slots remain usable.
    #[error("reference out of range: slot {index} of {len}")]
    OutOfRangeReference {
        /// The slot index that was dereferenced
        index: usize,
        /// Number of slots in the state payload
        len: usize,
    },

    /// A forward-declared placeholder never received its real shape. Raised
    /// only if and when the slot is actually read.
    #[error("forward reference {0} was never materialized")]
    UnresolvedForwardRef(u32),

    /// A tree-position record carried unbalanced open/close tokens, so no
    /// correct address exists for it.
    #[error("malformed tree address: {0}")]
    MalformedTreeAddress(String),

    /// A tag byte in the state payload matches no known value kind. The
    /// whole pass fails rather than silently dropping data.
    #[error("unsupported value kind: tag {0}")]
    UnsupportedValueKind(u64),

    /// The state payload parsed as an array literal but a slot's payload
    /// does not have the shape its tag demands.
    #[error("malformed payload at slot {slot}: {reason}")]
    MalformedPayload {
        /// The slot whose payload is malformed
        slot: usize,
        /// What was wrong with it
        reason: String,
    },

    /// The state text is not a well-formed array literal at all.
    #[error("state text is not a well-formed array literal: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::MalformedPayload`] with a formatted reason.
    pub(crate) fn malformed(slot: usize, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            slot,
            reason: reason.into(),
        }
    }
}
