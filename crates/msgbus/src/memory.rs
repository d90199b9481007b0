//! # In-Memory Reference Broker
//!
//! Delivers envelopes to handlers installed in the same process. It doubles
//! as a test double and as the canonical definition of the timing and
//! correlation behaviour every production driver must reproduce.
//!
//! ## Request Flow
//!
//! ```text
//!  caller                      worker task                     handler
//!    │  send_and_wait_response     │                              │
//!    │ ──────── spawn ───────────→ │  sleep(transport delay)      │
//!    │                             │  decode + verify request     │
//!    │  select! {                  │ ────── handle(payload) ────→ │
//!    │    reply   ← oneshot ─────  │ ←───────── reply ─────────── │
//!    │    timeout ← sleep          │  make_reply + encode         │
//!    │  }                          │                              │
//! ```
//!
//! The worker is never cancelled when the timeout fires first; its late reply
//! lands in a single-capacity channel nobody reads and is dropped with it.
//! When both are ready at once the reply wins: the reply arm is polled first,
//! and on expiry the caller yields once so a worker woken at the same
//! instant can still hand over its reply.
//!
//! ## Concurrency
//!
//! The subscription table sits behind a `parking_lot::RwLock`. The lock is
//! released before any handler runs, so handlers may (un)register targets.

use async_trait::async_trait;
use msgbus_types::{Envelope, Handle};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, DynBroker, DynMsgHandler, MsgHandler};
use crate::error::{BrokerError, RegistryError};
use crate::registry::BrokerRegistry;

/// Type name under which the reference driver registers.
pub const MEMORY_BROKER_TYPE: &str = "memory";

/// Simulated transport latency before a request reaches its handler.
pub const SIMULATED_TRANSPORT_DELAY: Duration = Duration::from_millis(1);

/// In-process broker driver.
pub struct MemoryBroker {
    /// Connection URI (informational only).
    uri: String,

    /// target → handler, at most one handler per target.
    subscriptions: RwLock<HashMap<String, DynMsgHandler>>,

    /// Set by `register`, cleared by `unregister`.
    connected: AtomicBool,

    /// Delay applied by the request worker before delivery.
    transport_delay: Duration,
}

impl MemoryBroker {
    /// Create a disconnected broker with no subscriptions.
    #[must_use]
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            subscriptions: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
            transport_delay: SIMULATED_TRANSPORT_DELAY,
        }
    }

    /// Override the simulated transport delay.
    #[must_use]
    pub fn with_transport_delay(mut self, delay: Duration) -> Self {
        self.transport_delay = delay;
        self
    }

    /// Register this driver's constructor under [`MEMORY_BROKER_TYPE`].
    pub fn register_factory(registry: &mut BrokerRegistry) -> Result<(), RegistryError> {
        registry.register_factory(MEMORY_BROKER_TYPE, |config| {
            Ok(Arc::new(MemoryBroker::new(&config.msgbus_uri)) as DynBroker)
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of installed handlers.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn handler(&self, target: &str) -> Option<DynMsgHandler> {
        self.subscriptions.read().get(target).cloned()
    }

    fn timeout_error(target: &str, handle: Handle, timeout: Duration) -> BrokerError {
        BrokerError::Timeout {
            target: target.to_string(),
            handle,
            timeout,
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &str {
        MEMORY_BROKER_TYPE
    }

    async fn register(&self) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::Release);
        info!(uri = %self.uri, "memory: connected");
        Ok(())
    }

    async fn unregister(&self) -> Result<(), BrokerError> {
        self.connected.store(false, Ordering::Release);
        info!(uri = %self.uri, "memory: disconnected");
        Ok(())
    }

    async fn register_msg_handler(
        &self,
        target: &str,
        handler: DynMsgHandler,
    ) -> Result<(), BrokerError> {
        let mut subscriptions = self.subscriptions.write();
        if subscriptions.contains_key(target) {
            return Err(BrokerError::DuplicateSubscription {
                target: target.to_string(),
            });
        }
        subscriptions.insert(target.to_string(), handler);
        debug!(msg_target = target, "memory: subscribed");
        Ok(())
    }

    async fn unregister_msg_handler(&self, target: &str) -> Result<(), BrokerError> {
        if self.subscriptions.write().remove(target).is_none() {
            return Err(BrokerError::SubscriptionNotFound {
                target: target.to_string(),
            });
        }
        debug!(msg_target = target, "memory: unsubscribed");
        Ok(())
    }

    async fn send(&self, data: Vec<u8>, target: &str) -> Result<(), BrokerError> {
        let Some(handler) = self.handler(target) else {
            debug!(msg_target = target, bytes = data.len(), "memory: no handler, message dropped");
            return Ok(());
        };

        let envelope = Envelope::decode_verified(&data).map_err(|e| {
            error!(msg_target = target, error = %e, "memory: corrupted envelope");
            BrokerError::from(e)
        })?;

        // Fire-and-forget: the handler's result is discarded.
        if let Err(e) = handler.handle(envelope.payload(), false) {
            warn!(msg_target = target, error = %e, "memory: handler failed on fire-and-forget message");
        }

        debug!(msg_target = target, bytes = data.len(), "memory: sent");
        Ok(())
    }

    async fn send_and_wait_response(
        &self,
        data: Vec<u8>,
        target: &str,
        handle: Handle,
        timeout: Duration,
    ) -> Result<Vec<u8>, BrokerError> {
        let Some(handler) = self.handler(target) else {
            // Emulate a round-trip that never comes back.
            if !timeout.is_zero() {
                tokio::time::sleep(timeout).await;
            }
            warn!(msg_target = target, %handle, "memory: no handler, request timed out");
            return Err(Self::timeout_error(target, handle, timeout));
        };

        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let (reply_tx, mut reply_rx) = oneshot::channel();

        let delay = self.transport_delay;
        let worker_target = target.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let outcome = match serve_request(&data, handle, handler.as_ref()) {
                Ok(Some(reply)) => Ok(reply),
                Ok(None) => return,
                Err(e) => {
                    error!(msg_target = %worker_target, %handle, error = %e, "memory: request failed");
                    Err(e)
                }
            };

            if reply_tx.send(outcome).is_err() {
                debug!(msg_target = %worker_target, %handle, "memory: late reply discarded");
            }
        });

        let waited = tokio::select! {
            biased;
            reply = &mut reply_rx => Some(reply),
            () = expiry(deadline) => None,
        };

        match waited {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) => {
                // The worker finished without replying: the request did not
                // ask for one. Nothing else can arrive, so let the clock run out.
                if let Some(deadline) = deadline {
                    tokio::time::sleep_until(deadline).await;
                }
                warn!(msg_target = target, %handle, "memory: request produced no reply");
                Err(Self::timeout_error(target, handle, timeout))
            }
            None => {
                // A worker woken at the same instant as the deadline still wins.
                tokio::task::yield_now().await;
                if let Ok(outcome) = reply_rx.try_recv() {
                    return outcome;
                }
                warn!(msg_target = target, %handle, ?timeout, "memory: request timed out");
                Err(Self::timeout_error(target, handle, timeout))
            }
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Deliver one request to its handler and build the serialized reply.
///
/// Returns `Ok(None)` when the request did not ask for a reply.
fn serve_request(
    data: &[u8],
    handle: Handle,
    handler: &dyn MsgHandler,
) -> Result<Option<Vec<u8>>, BrokerError> {
    let request = Envelope::decode_verified(data)?;
    if request.handle() != handle {
        return Err(BrokerError::IntegrityFault(format!(
            "request handle {} does not match correlation handle {handle}",
            request.handle()
        )));
    }

    let response_expected = request.is_response_expected();
    debug!(
        bytes = request.payload().len(),
        flags = request.flags().bits(),
        "memory: received a message"
    );

    let reply = handler
        .handle(request.payload(), response_expected)
        .map_err(|e| BrokerError::HandlerFailed(e.to_string()))?;

    if !response_expected {
        return Ok(None);
    }

    let payload = match reply {
        Some(payload) if !payload.is_empty() => payload,
        _ => {
            return Err(BrokerError::BadAppResponse(
                "handler promised a reply and produced none".to_string(),
            ))
        }
    };

    let response = request.make_reply(payload);
    debug!(handle = %response.handle(), "memory: sending reply");
    Ok(Some(response.encode()?))
}
