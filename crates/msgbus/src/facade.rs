//! # Msgbus Facade
//!
//! The application-facing bus. Validates every call, owns the active broker,
//! binds it to the host lifecycle and performs request/reply correlation.
//!
//! ## Outbound Flow
//!
//! ```text
//! send(payload, target)
//!   → validate (broker active, target, payload)
//!   → Envelope::new / Envelope::request
//!   → generate_hash → encode
//!   → broker.send / broker.send_and_wait_response
//!   → decode_verified(reply) → reply.handle == request.handle
//! ```
//!
//! ## State
//!
//! The active broker and the `running` flag live together in one
//! [`BusState`] behind a read/write lock, so a health probe never sees a
//! flag that disagrees with the installed broker. Probes take the read lock
//! and proceed together.
//!
//! Start and stop are serialised by an async lifecycle guard held across the
//! broker's `register`/`unregister` awaits. The state lock itself is never
//! held across an await.

use async_trait::async_trait;
use msgbus_types::{Envelope, Handle};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, Instrument};

use crate::broker::{DynBroker, MsgHandler};
use crate::config::MsgbusConfig;
use crate::error::MsgbusError;
use crate::lifecycle::{Lifecycle, LifecycleContext};
use crate::registry::BrokerRegistry;

/// The message bus.
///
/// Caller-owned: construct one per process (or per isolated domain), start
/// it, share it behind an `Arc` and stop it explicitly.
pub struct Msgbus {
    config: MsgbusConfig,
    registry: Arc<BrokerRegistry>,
    state: RwLock<BusState>,
    /// Held for the whole of a start or stop transition.
    lifecycle: Mutex<()>,
}

/// Installed broker and health flag, always updated together.
#[derive(Default)]
struct BusState {
    broker: Option<DynBroker>,
    running: bool,
}

impl Msgbus {
    /// Create a stopped bus. The broker is built from `config` on `start`.
    pub fn new(config: MsgbusConfig, registry: Arc<BrokerRegistry>) -> Self {
        Self {
            config,
            registry,
            state: RwLock::new(BusState::default()),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &MsgbusConfig {
        &self.config
    }

    /// The running flag; the only externally observable health signal.
    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    fn active_broker(&self) -> Result<DynBroker, MsgbusError> {
        self.state
            .read()
            .broker
            .clone()
            .ok_or(MsgbusError::NotInitialized)
    }

    /// Install the single handler for `target`.
    ///
    /// # Errors
    ///
    /// - `MsgbusError::NotInitialized` - no active broker
    /// - `MsgbusError::BadSubscription` - empty target
    /// - `BrokerError::DuplicateSubscription` - a handler already exists
    pub async fn register_msg_handler<H>(&self, target: &str, handler: H) -> Result<(), MsgbusError>
    where
        H: MsgHandler + 'static,
    {
        let broker = self.active_broker()?;
        if target.is_empty() {
            return Err(MsgbusError::BadSubscription);
        }
        broker
            .register_msg_handler(target, Arc::new(handler))
            .await
            .map_err(Into::into)
    }

    /// Remove the handler for `target`.
    ///
    /// # Errors
    ///
    /// - `MsgbusError::NotInitialized` - no active broker
    /// - `MsgbusError::BadSubscription` - empty target
    /// - `BrokerError::SubscriptionNotFound` - no handler installed
    pub async fn unregister_msg_handler(&self, target: &str) -> Result<(), MsgbusError> {
        let broker = self.active_broker()?;
        if target.is_empty() {
            return Err(MsgbusError::BadSubscription);
        }
        broker
            .unregister_msg_handler(target)
            .await
            .map_err(Into::into)
    }

    /// Fire-and-forget `data` to `target`.
    ///
    /// Success means the broker accepted the bytes, not that a handler ran.
    pub async fn send(&self, data: &[u8], target: &str) -> Result<(), MsgbusError> {
        let broker = self.active_broker()?;
        validate_outbound(data, target)?;

        let mut envelope = Envelope::new(data);
        envelope.generate_hash();
        let bytes = envelope.encode()?;

        debug!(msg_target = target, handle = %envelope.handle(), bytes = bytes.len(), "msgbus: send");
        broker.send(bytes, target).await.map_err(Into::into)
    }

    /// Send `data` to `target` and wait for the correlated reply.
    ///
    /// `Duration::ZERO` waits indefinitely. Returns the reply payload and the
    /// handle generated for the request.
    ///
    /// # Errors
    ///
    /// - Validation errors as for [`send`](Self::send)
    /// - `BrokerError::Timeout` (see [`MsgbusError::is_timeout`])
    /// - `MsgbusError::IntegrityFault` - corrupted reply, reply for another
    ///   handle, or a handler that failed to produce a reply
    pub async fn send_and_wait_response(
        &self,
        data: &[u8],
        target: &str,
        timeout: Duration,
    ) -> Result<(Vec<u8>, Handle), MsgbusError> {
        let broker = self.active_broker()?;
        validate_outbound(data, target)?;

        let mut request = Envelope::request(data);
        request.generate_hash();
        let bytes = request.encode()?;
        let handle = request.handle();

        debug!(msg_target = target, %handle, ?timeout, "msgbus: request");
        let reply_bytes = broker
            .send_and_wait_response(bytes, target, handle, timeout)
            .await?;

        let reply = Envelope::decode_verified(&reply_bytes).map_err(|e| {
            error!(msg_target = target, %handle, error = %e, "msgbus: corrupted reply");
            MsgbusError::from(e)
        })?;

        if reply.handle() != handle {
            error!(
                msg_target = target,
                request = %handle,
                reply = %reply.handle(),
                "msgbus: request response mismatch"
            );
            return Err(MsgbusError::IntegrityFault(format!(
                "reply handle {} does not match request handle {handle}",
                reply.handle()
            )));
        }

        Ok((reply.into_payload(), handle))
    }
}

fn validate_outbound(data: &[u8], target: &str) -> Result<(), MsgbusError> {
    if target.is_empty() {
        return Err(MsgbusError::BadSubscription);
    }
    if data.is_empty() {
        return Err(MsgbusError::BadPayload);
    }
    Ok(())
}

impl fmt::Debug for Msgbus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msgbus")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

#[async_trait]
impl Lifecycle for Msgbus {
    type Error = MsgbusError;

    async fn configure(&self, _ctx: &LifecycleContext) -> Result<(), MsgbusError> {
        Ok(())
    }

    /// Build the broker from configuration and connect it.
    async fn start(&self, ctx: &LifecycleContext) -> Result<(), MsgbusError> {
        async {
            let _transition = self.lifecycle.lock().await;
            if self.state.read().broker.is_some() {
                return Err(MsgbusError::AlreadyStarted);
            }

            let broker = self.registry.create(&self.config)?;
            broker.register().await?;

            *self.state.write() = BusState {
                broker: Some(broker),
                running: true,
            };
            info!(broker_type = %self.config.msgbus_type, "msgbus: started");
            Ok::<(), MsgbusError>(())
        }
        .instrument(ctx.span().clone())
        .await
    }

    /// Disconnect and release the broker. The bus is marked stopped before
    /// the disconnect, so it reads as stopped even if the disconnect fails.
    async fn stop(&self, ctx: &LifecycleContext) -> Result<(), MsgbusError> {
        async {
            let _transition = self.lifecycle.lock().await;
            let broker = std::mem::take(&mut *self.state.write()).broker;
            let result = match broker {
                Some(broker) => broker.unregister().await.map_err(MsgbusError::from),
                None => Err(MsgbusError::NotInitialized),
            };

            info!(ok = result.is_ok(), "msgbus: stopped");
            result
        }
        .instrument(ctx.span().clone())
        .await
    }

    async fn is_healthy(&self, _ctx: &LifecycleContext) -> bool {
        self.is_running()
    }
}
