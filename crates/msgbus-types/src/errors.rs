//! # Error Types
//!
//! Failures of the envelope codec.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while encoding, decoding or verifying an envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The envelope could not be serialized.
    #[error("msg: unable to marshal: {0}")]
    Encode(String),

    /// The byte sequence is not a well-formed envelope.
    #[error("msg: unable to unmarshal: {0}")]
    Decode(String),

    /// The carried hash does not match the recomputed one.
    #[error("msg: failed to verify hash for handle {handle} (carried {carried}, computed {computed})")]
    HashMismatch {
        handle: Uuid,
        carried: String,
        computed: String,
    },
}
