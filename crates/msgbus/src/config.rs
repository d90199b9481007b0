//! Msgbus configuration block.
//!
//! The hosting process resolves this block before `start()`. It names the
//! broker type (looked up in the [`BrokerRegistry`](crate::BrokerRegistry))
//! and the broker connection URI, which is interpreted by the driver alone.

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ConfigError;
use crate::memory::MEMORY_BROKER_TYPE;

/// Key of the msgbus block inside a host configuration document.
pub const CONFIG_KEY: &str = "msgbus";

/// Default URI handed to the in-memory driver, which ignores it.
pub const DEFAULT_URI: &str = "memory://local";

/// Configuration consumed from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgbusConfig {
    /// Registered broker type name.
    pub msgbus_type: String,

    /// Broker connection URI.
    #[serde(default)]
    pub msgbus_uri: String,
}

impl Default for MsgbusConfig {
    fn default() -> Self {
        Self {
            msgbus_type: MEMORY_BROKER_TYPE.to_string(),
            msgbus_uri: DEFAULT_URI.to_string(),
        }
    }
}

impl MsgbusConfig {
    pub fn new(msgbus_type: impl Into<String>, msgbus_uri: impl Into<String>) -> Self {
        Self {
            msgbus_type: msgbus_type.into(),
            msgbus_uri: msgbus_uri.into(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MSGBUS_TYPE`: Broker type (default: memory)
    /// - `MSGBUS_URI`: Broker connection URI (default: memory://local)
    pub fn from_env() -> Self {
        Self {
            msgbus_type: env::var("MSGBUS_TYPE")
                .unwrap_or_else(|_| MEMORY_BROKER_TYPE.to_string()),
            msgbus_uri: env::var("MSGBUS_URI").unwrap_or_else(|_| DEFAULT_URI.to_string()),
        }
    }

    /// Extract the `"msgbus"` block from a host JSON document.
    ///
    /// ```ignore
    /// let config = MsgbusConfig::from_json_block(
    ///     r#"{"msgbus": {"msgbus_type": "memory", "msgbus_uri": "memory://local"}}"#,
    /// )?;
    /// ```
    pub fn from_json_block(document: &str) -> Result<Self, ConfigError> {
        let mut root: serde_json::Value =
            serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let block = root
            .get_mut(CONFIG_KEY)
            .map(serde_json::Value::take)
            .ok_or_else(|| ConfigError::MissingBlock(CONFIG_KEY.to_string()))?;

        let config: MsgbusConfig =
            serde_json::from_value(block).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.msgbus_type.trim().is_empty() {
            return Err(ConfigError::MissingBrokerType);
        }
        Ok(())
    }
}
