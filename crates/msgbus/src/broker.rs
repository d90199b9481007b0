//! # Broker Contract
//!
//! The polymorphic transport interface. Brokers move already-serialized
//! envelope bytes; they never build envelopes for outbound traffic themselves,
//! except for replies produced on behalf of a local handler.
//!
//! ## Delivery Semantics
//!
//! - `send` is at-most-once, fire-and-forget. Bytes sent to a target with no
//!   handler are dropped silently.
//! - `send_and_wait_response` suspends the caller until a reply carrying the
//!   request handle arrives or the timeout elapses. `Duration::ZERO` waits
//!   indefinitely.
//! - No ordering across targets or concurrent requests. Correlation is by
//!   handle equality only.

use async_trait::async_trait;
use msgbus_types::Handle;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BrokerError, HandlerError};

/// Application callback installed for a target.
///
/// Receives the verified payload and whether the sender waits for a reply.
/// When `response_expected` is true the handler must return a non-empty
/// reply; anything else is reported to the requester as an integrity fault.
pub trait MsgHandler: Send + Sync {
    fn handle(&self, payload: &[u8], response_expected: bool)
        -> Result<Option<Vec<u8>>, HandlerError>;
}

impl<F> MsgHandler for F
where
    F: Fn(&[u8], bool) -> Result<Option<Vec<u8>>, HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        payload: &[u8],
        response_expected: bool,
    ) -> Result<Option<Vec<u8>>, HandlerError> {
        self(payload, response_expected)
    }
}

/// Shared handle to an installed handler.
pub type DynMsgHandler = Arc<dyn MsgHandler>;

/// Transport driver interface.
///
/// Implementations: [`MemoryBroker`](crate::MemoryBroker) (reference driver
/// and test double). Production transports plug in through the
/// [`BrokerRegistry`](crate::BrokerRegistry).
#[async_trait]
pub trait Broker: Send + Sync {
    /// Transport type name, as registered.
    fn name(&self) -> &str;

    /// Connect to the transport.
    async fn register(&self) -> Result<(), BrokerError>;

    /// Disconnect from the transport. Installed handlers are kept.
    async fn unregister(&self) -> Result<(), BrokerError>;

    /// Install the single handler for `target`.
    ///
    /// # Errors
    ///
    /// `BrokerError::DuplicateSubscription` if one is already installed.
    async fn register_msg_handler(
        &self,
        target: &str,
        handler: DynMsgHandler,
    ) -> Result<(), BrokerError>;

    /// Remove the handler for `target`.
    ///
    /// # Errors
    ///
    /// `BrokerError::SubscriptionNotFound` if none is installed.
    async fn unregister_msg_handler(&self, target: &str) -> Result<(), BrokerError>;

    /// Fire-and-forget delivery of serialized envelope bytes.
    async fn send(&self, data: Vec<u8>, target: &str) -> Result<(), BrokerError>;

    /// Deliver a request and wait for the serialized reply envelope.
    async fn send_and_wait_response(
        &self,
        data: Vec<u8>,
        target: &str,
        handle: Handle,
        timeout: Duration,
    ) -> Result<Vec<u8>, BrokerError>;
}

/// Shared handle to a broker driver.
pub type DynBroker = Arc<dyn Broker>;
