//! # Error Types
//!
//! Error taxonomy of the bus:
//!
//! - **Configuration** (`ConfigError`, `RegistryError`): raised eagerly at startup.
//! - **Validation** (`MsgbusError::NotInitialized`, `BadSubscription`, `BadPayload`):
//!   returned to the caller, who decides whether to retry.
//! - **Subscription / transport** (`BrokerError`): returned to the caller; a
//!   timeout is its own variant so callers can tell it apart.
//! - **Integrity faults**: hash or handle mismatches and broken handlers. These
//!   signal corruption or a driver bug and are surfaced as a distinct category
//!   so the host can decide whether to escalate.

use msgbus_types::{EnvelopeError, Handle};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by an application message handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors from broker drivers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Connecting to or disconnecting from the transport failed.
    #[error("broker: connection failed: {0}")]
    Connection(String),

    /// A handler is already installed for the target.
    #[error("broker: duplicate subscription for [{target}]")]
    DuplicateSubscription { target: String },

    /// No handler is installed for the target.
    #[error("broker: subscription not found for [{target}]")]
    SubscriptionNotFound { target: String },

    /// No reply arrived within the timeout.
    #[error("broker: timeout waiting on [{target}] for reply to {handle} (timeout {timeout:?})")]
    Timeout {
        target: String,
        handle: Handle,
        timeout: Duration,
    },

    /// The transport refused the outbound bytes.
    #[error("broker: send error: {0}")]
    Send(String),

    /// The handler promised a reply and produced none.
    #[error("broker: bad app response: {0}")]
    BadAppResponse(String),

    /// The handler reported a failure while serving a request.
    #[error("broker: handler failed: {0}")]
    HandlerFailed(String),

    /// Envelope corruption or protocol violation.
    #[error("broker: integrity fault: {0}")]
    IntegrityFault(String),
}

impl BrokerError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrokerError::Timeout { .. })
    }

    /// Broken handlers count as integrity faults: the request protocol
    /// cannot complete and retrying will not help.
    #[must_use]
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            BrokerError::IntegrityFault(_)
                | BrokerError::BadAppResponse(_)
                | BrokerError::HandlerFailed(_)
        )
    }
}

impl From<EnvelopeError> for BrokerError {
    fn from(err: EnvelopeError) -> Self {
        BrokerError::IntegrityFault(err.to_string())
    }
}

/// Errors from the broker factory catalogue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Factories must be registered under a non-empty name.
    #[error("broker: invalid broker (empty factory name)")]
    EmptyName,

    /// A factory with this name already exists.
    #[error("broker: duplicate broker registration [{0}]")]
    DuplicateFactory(String),

    /// No factory is registered for the configured type.
    #[error("broker: unsupported type [{0}]")]
    UnsupportedType(String),

    /// The factory was found but failed to build a broker.
    #[error("broker: unable to construct [{name}]: {source}")]
    Construction {
        name: String,
        #[source]
        source: BrokerError,
    },
}

/// Errors while resolving the configuration block.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("msgbus: bad configuration: broker type is empty")]
    MissingBrokerType,

    #[error("msgbus: bad configuration: block [{0}] not found")]
    MissingBlock(String),

    #[error("msgbus: bad configuration: {0}")]
    Parse(String),
}

/// Errors returned by the [`Msgbus`](crate::Msgbus) facade.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MsgbusError {
    /// No broker is active (not started, or already stopped).
    #[error("msgbus: not initialized")]
    NotInitialized,

    /// Start was called while a broker is already active.
    #[error("msgbus: already started")]
    AlreadyStarted,

    /// Empty target name.
    #[error("msgbus: bad subscription")]
    BadSubscription,

    /// Empty payload.
    #[error("msgbus: bad payload")]
    BadPayload,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Broker(BrokerError),

    /// Hash mismatch, reply/request handle mismatch or a broken handler.
    #[error("msgbus: integrity fault: {0}")]
    IntegrityFault(String),
}

impl MsgbusError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, MsgbusError::Broker(e) if e.is_timeout())
    }

    #[must_use]
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, MsgbusError::IntegrityFault(_))
    }
}

impl From<BrokerError> for MsgbusError {
    fn from(err: BrokerError) -> Self {
        if err.is_integrity_fault() {
            MsgbusError::IntegrityFault(err.to_string())
        } else {
            MsgbusError::Broker(err)
        }
    }
}

impl From<EnvelopeError> for MsgbusError {
    fn from(err: EnvelopeError) -> Self {
        MsgbusError::IntegrityFault(err.to_string())
    }
}
