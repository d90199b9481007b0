//! # Msgbus Runtime
//!
//! Demonstration host: starts a bus from environment configuration, sends one
//! message and one request to the echo target, then shuts down.

use anyhow::Result;
use msgbus::MsgbusConfig;
use tracing::info;

use msgbus_runtime::{build_bus, init_tracing, run};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = MsgbusConfig::from_env();
    info!(
        broker_type = %config.msgbus_type,
        uri = %config.msgbus_uri,
        "Loaded msgbus configuration"
    );

    let bus = build_bus(config)?;
    let reply = run(&bus, b"ca va!").await?;

    info!(reply = %String::from_utf8_lossy(&reply), "Done");
    Ok(())
}
