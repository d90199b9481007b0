//! # Msgbus Types Crate
//!
//! The wire unit exchanged between the [`Envelope`] producers (the bus facade)
//! and the broker drivers that move serialized bytes between processes.
//!
//! ## Design Principles
//!
//! - **Opaque Payloads**: The bus never interprets application bytes.
//! - **Integrity Hash**: Every envelope carries `SHA-1(payload ‖ handle ‖ flags)`
//!   which receivers re-verify before reading the payload. This detects
//!   transport corruption and driver bugs; it is not an authenticity guarantee.
//! - **Handle Correlation**: A reply keeps the request's handle, which is the
//!   only link between the two.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod envelope;
pub mod errors;

pub use envelope::{Envelope, Handle, MsgFlags, MsgHash, HANDLE_LEN, HASH_LEN};
pub use errors::EnvelopeError;
