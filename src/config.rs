//! Registrar configuration.

use serde::Deserialize;

/// Name of the record the registry is persisted under.
pub const DEFAULT_RECORD_NAME: &str = "RESOURCE_PROVIDER_REGISTRAR";

/// Settings for a [`GenericRegistrar`](crate::registrar::GenericRegistrar).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Storage key of the persisted registry.
    pub record_name: String,
    /// Capacity of the actor's mailbox. Callers wait for space when it is full;
    /// the queue of accepted operations itself is unbounded.
    pub mailbox_capacity: usize,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            record_name: DEFAULT_RECORD_NAME.to_string(),
            mailbox_capacity: 32,
        }
    }
}
