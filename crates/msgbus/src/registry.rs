//! # Broker Registry
//!
//! Catalogue mapping a transport type name to a broker constructor.
//!
//! The registry is an explicit object built by the composition root: each
//! driver exposes a registration call (e.g. [`MemoryBroker::register_factory`])
//! which the application invokes once at startup. Afterwards the registry is
//! shared read-only behind an `Arc`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = BrokerRegistry::new();
//! MemoryBroker::register_factory(&mut registry)?;
//!
//! let bus = Msgbus::new(MsgbusConfig::default(), Arc::new(registry));
//! ```
//!
//! [`MemoryBroker::register_factory`]: crate::MemoryBroker::register_factory

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::broker::DynBroker;
use crate::config::MsgbusConfig;
use crate::error::{BrokerError, RegistryError};

/// Broker constructor.
pub type BrokerFactory =
    Arc<dyn Fn(&MsgbusConfig) -> Result<DynBroker, BrokerError> + Send + Sync>;

/// Name → constructor catalogue.
#[derive(Default)]
pub struct BrokerRegistry {
    factories: HashMap<String, BrokerFactory>,
}

impl BrokerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a broker constructor under `name`.
    ///
    /// Missing or duplicate drivers are deployment bugs: callers propagate
    /// these errors out of startup instead of tolerating them.
    ///
    /// # Errors
    ///
    /// - `RegistryError::EmptyName` - `name` is empty
    /// - `RegistryError::DuplicateFactory` - `name` is already registered
    pub fn register_factory<F>(&mut self, name: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&MsgbusConfig) -> Result<DynBroker, BrokerError> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.factories.contains_key(name) {
            return Err(RegistryError::DuplicateFactory(name.to_string()));
        }

        self.factories.insert(name.to_string(), Arc::new(factory));
        info!(factory = name, "msgbus: registered factory");
        Ok(())
    }

    /// Construct the broker named by `config.msgbus_type`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::UnsupportedType` - no factory for the type name
    /// - `RegistryError::Construction` - the factory itself failed
    pub fn create(&self, config: &MsgbusConfig) -> Result<DynBroker, RegistryError> {
        let factory = self
            .factories
            .get(&config.msgbus_type)
            .ok_or_else(|| RegistryError::UnsupportedType(config.msgbus_type.clone()))?;

        debug!(
            broker_type = %config.msgbus_type,
            uri = %config.msgbus_uri,
            "Constructing broker"
        );

        factory(config).map_err(|source| RegistryError::Construction {
            name: config.msgbus_type.clone(),
            source,
        })
    }

    /// Check if a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered factory names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for BrokerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("factories", &self.names())
            .finish()
    }
}
