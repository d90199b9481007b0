//! # Wire Envelope
//!
//! The single transmission unit of the bus.
//!
//! ## Wire Layout
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────────┬───────────────┬───────────┬──────────┐
//! │ u64 LE (=16) │ handle (16 B) │ u64 LE (len) │ payload bytes │ flags u32 │ hash 20B │
//! └──────────────┴───────────────┴──────────────┴───────────────┴───────────┴──────────┘
//! ```
//!
//! ## Integrity
//!
//! `hash = SHA-1(payload ‖ handle ‖ flags as 4-byte little-endian)`. It is
//! recomputed before every send and re-verified by every receiver before
//! the payload is read.

use bincode::Options;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use uuid::Uuid;

use crate::errors::EnvelopeError;

/// Correlation handle carried by every envelope.
pub type Handle = Uuid;

/// Length of an encoded handle in bytes.
pub const HANDLE_LEN: usize = 16;

/// Length of the integrity hash in bytes.
pub const HASH_LEN: usize = 20;

/// SHA-1 digest over the hashed fields.
pub type MsgHash = [u8; HASH_LEN];

/// Envelope flag bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgFlags(u32);

impl MsgFlags {
    /// No flags set.
    pub const EMPTY: MsgFlags = MsgFlags(0);

    /// The sender suspends until a reply carrying the same handle arrives.
    pub const RESPONSE_EXPECTED: MsgFlags = MsgFlags(1);

    /// Build flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: MsgFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set every bit of `other`.
    pub fn insert(&mut self, other: MsgFlags) {
        self.0 |= other.0;
    }
}

/// The transmission unit: handle, opaque payload, flags and integrity hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    handle: Handle,
    payload: Vec<u8>,
    flags: MsgFlags,
    hash: MsgHash,
}

impl Envelope {
    /// Create an envelope with a fresh handle, empty flags and an empty hash.
    #[must_use]
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self::with_handle(Uuid::new_v4(), payload)
    }

    /// Create an envelope with a caller-chosen handle.
    #[must_use]
    pub fn with_handle(handle: Handle, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            handle,
            payload: payload.into(),
            flags: MsgFlags::EMPTY,
            hash: [0u8; HASH_LEN],
        }
    }

    /// Create an envelope that asks the receiver for a reply.
    #[must_use]
    pub fn request(payload: impl Into<Vec<u8>>) -> Self {
        let mut envelope = Self::new(payload);
        envelope.flags.insert(MsgFlags::RESPONSE_EXPECTED);
        envelope
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn flags(&self) -> MsgFlags {
        self.flags
    }

    pub fn hash(&self) -> &MsgHash {
        &self.hash
    }

    /// Replace the flags. The hash must be regenerated afterwards.
    pub fn set_flags(&mut self, flags: MsgFlags) {
        self.flags = flags;
    }

    /// Replace the payload. The hash must be regenerated afterwards.
    pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = payload.into();
    }

    /// Replace the handle. The hash must be regenerated afterwards.
    pub fn set_handle(&mut self, handle: Handle) {
        self.handle = handle;
    }

    pub fn is_response_expected(&self) -> bool {
        self.flags.contains(MsgFlags::RESPONSE_EXPECTED)
    }

    // =========================================================================
    // INTEGRITY
    // =========================================================================

    /// SHA-1 over payload, handle bytes and little-endian flags.
    #[must_use]
    pub fn compute_hash(&self) -> MsgHash {
        let mut hasher = Sha1::new();
        hasher.update(&self.payload);
        hasher.update(self.handle.as_bytes());
        hasher.update(self.flags.bits().to_le_bytes());
        let digest = hasher.finalize();

        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&digest);
        hash
    }

    /// Recompute and store the hash.
    pub fn generate_hash(&mut self) {
        self.hash = self.compute_hash();
    }

    /// Recompute the hash and compare it with the carried one.
    ///
    /// # Errors
    ///
    /// `EnvelopeError::HashMismatch` if any hashed field changed after the
    /// hash was generated. Callers treat this as an integrity fault.
    pub fn verify_hash(&self) -> Result<(), EnvelopeError> {
        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(EnvelopeError::HashMismatch {
                handle: self.handle,
                carried: hex::encode(self.hash),
                computed: hex::encode(computed),
            });
        }
        Ok(())
    }

    /// Build the reply to this envelope.
    ///
    /// The reply keeps the request's handle and flags, carries `payload`
    /// and has a freshly computed hash.
    #[must_use]
    pub fn make_reply(&self, payload: impl Into<Vec<u8>>) -> Envelope {
        let mut reply = self.clone();
        reply.payload = payload.into();
        reply.generate_hash();
        reply
    }

    // =========================================================================
    // CODEC
    // =========================================================================

    /// Serialize into the length-delimited wire layout.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        wire_options()
            .serialize(self)
            .map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    /// Parse the wire layout. Trailing bytes are rejected.
    pub fn decode(data: &[u8]) -> Result<Envelope, EnvelopeError> {
        wire_options()
            .deserialize(data)
            .map_err(|e| EnvelopeError::Decode(e.to_string()))
    }

    /// Decode and verify in one step, as every receiver must.
    pub fn decode_verified(data: &[u8]) -> Result<Envelope, EnvelopeError> {
        let envelope = Self::decode(data)?;
        envelope.verify_hash()?;
        Ok(envelope)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("handle", &self.handle)
            .field("payload_len", &self.payload.len())
            .field("flags", &self.flags.bits())
            .field("hash", &hex::encode(self.hash))
            .finish()
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}
