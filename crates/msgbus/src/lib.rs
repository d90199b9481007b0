//! # Msgbus - Transport-Agnostic Message Bus
//!
//! Applications exchange opaque byte payloads with named targets, either
//! fire-and-forget or request/reply, without knowing which transport carries
//! them. Transports plug in as [`Broker`] drivers through a [`BrokerRegistry`].
//!
//! ## Architecture
//!
//! ```text
//!   application
//!        │  send / send_and_wait_response / register_msg_handler
//!        ▼
//! ┌──────────────┐  create(config)  ┌────────────────┐
//! │    Msgbus    │ ───────────────→ │ BrokerRegistry │
//! │   (facade)   │                  └────────────────┘
//! └──────────────┘
//!        │  envelope bytes
//!        ▼
//! ┌──────────────┐                  ┌────────────────┐
//! │ dyn Broker   │ ───────────────→ │  MsgHandler    │
//! │ (driver)     │    payload       │  (per target)  │
//! └──────────────┘                  └────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Every envelope is hashed before it leaves the facade and verified before
//!   a handler or requester reads its payload.
//! - A reply is accepted only if it carries the request's handle.
//! - At most one handler per target.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod config;
pub mod error;
pub mod facade;
pub mod lifecycle;
pub mod memory;
pub mod registry;

pub use broker::{Broker, DynBroker, DynMsgHandler, MsgHandler};
pub use config::{MsgbusConfig, CONFIG_KEY, DEFAULT_URI};
pub use error::{BrokerError, ConfigError, HandlerError, MsgbusError, RegistryError};
pub use facade::Msgbus;
pub use lifecycle::{Lifecycle, LifecycleContext};
pub use memory::{MemoryBroker, MEMORY_BROKER_TYPE};
pub use registry::{BrokerFactory, BrokerRegistry};

pub use msgbus_types::{Envelope, EnvelopeError, Handle, MsgFlags};
