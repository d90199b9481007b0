//! # Msgbus Runtime
//!
//! Composition root for the message bus. Nothing here is global: the broker
//! registry is built explicitly and handed to the bus.
//!
//! ## Startup Sequence
//!
//! 1. Install the log subscriber (`MSGBUS_LOG_LEVEL` or `RUST_LOG`)
//! 2. Register every compiled-in broker driver
//! 3. Load configuration (from env)
//! 4. `configure` → `start` the bus
//! 5. Serve traffic, then `stop`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use msgbus::{
    BrokerRegistry, HandlerError, Lifecycle, LifecycleContext, MemoryBroker, Msgbus, MsgbusConfig,
    RegistryError,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Target served by the demonstration echo handler.
pub const ECHO_TARGET: &str = "match";

/// Reply wait used by the demonstration request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install the global `fmt` subscriber.
///
/// Filter precedence: `MSGBUS_LOG_LEVEL`, then `RUST_LOG`, then `info`.
pub fn init_tracing() -> Result<()> {
    let filter = std::env::var("MSGBUS_LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Registry with every driver this binary ships.
pub fn build_registry() -> Result<BrokerRegistry, RegistryError> {
    let mut registry = BrokerRegistry::new();
    MemoryBroker::register_factory(&mut registry)?;
    Ok(registry)
}

/// Answers requests with their own payload; ignores fire-and-forget traffic.
pub fn echo(payload: &[u8], response_expected: bool) -> Result<Option<Vec<u8>>, HandlerError> {
    Ok(response_expected.then(|| payload.to_vec()))
}

/// Build a stopped bus for `config` over the shipped drivers.
pub fn build_bus(config: MsgbusConfig) -> Result<Msgbus> {
    config.validate().context("invalid msgbus configuration")?;
    let registry = build_registry().context("failed to register broker drivers")?;
    Ok(Msgbus::new(config, Arc::new(registry)))
}

/// Drive one full lifecycle with a send and a request/response in between.
///
/// Returns the reply payload.
pub async fn run(bus: &Msgbus, payload: &[u8]) -> Result<Vec<u8>> {
    let ctx = LifecycleContext::new(tracing::info_span!("msgbus"));

    bus.configure(&ctx).await.context("configure failed")?;
    bus.start(&ctx).await.context("start failed")?;
    info!(healthy = bus.is_healthy(&ctx).await, "Bus started");

    let traffic = async {
        bus.register_msg_handler(ECHO_TARGET, echo)
            .await
            .context("failed to register echo handler")?;

        bus.send(payload, ECHO_TARGET).await.context("send failed")?;

        let (reply, handle) = bus
            .send_and_wait_response(payload, ECHO_TARGET, REQUEST_TIMEOUT)
            .await
            .context("request failed")?;
        info!(%handle, bytes = reply.len(), "Reply received");
        Ok::<_, anyhow::Error>(reply)
    }
    .await;

    // Stop regardless of how the traffic went; the traffic error wins.
    let stopped = bus.stop(&ctx).await.context("stop failed");
    let reply = traffic?;
    stopped?;

    info!(healthy = bus.is_healthy(&ctx).await, "Bus stopped");
    Ok(reply)
}
