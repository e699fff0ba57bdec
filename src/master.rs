//! # Master-backed Registrar
//!
//! Some hosts already keep a larger composite registry with its own commit
//! protocol. Rather than persisting the resource-provider registry a second time,
//! [`MasterBackedRegistrar`] wraps each [`Operation`] in an [`AdaptedOperation`]
//! and hands it to that host's [`MasterRegistrar`]. Atomicity, versioning and
//! recovery are whatever the host provides.

use crate::error::{OperationError, RegistrarError};
use crate::model::Registry;
use crate::operation::Operation;
use crate::registrar::Registrar;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// The composite registry owned by the external registrar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRegistry {
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub resource_provider_registry: Registry,
}

/// A mutation of the composite registry, run by the external registrar inside
/// its own transaction.
pub trait RegistryOperation: Send + Sync {
    fn perform(&mut self, registry: &mut MasterRegistry) -> Result<bool, OperationError>;
}

/// Contract of the external composite registrar.
///
/// Implementations resolve with the operation's own result once it is durable,
/// and surface a rejected operation as [`RegistrarError::Rejected`].
#[async_trait]
pub trait MasterRegistrar: Send + Sync {
    async fn apply(&self, operation: Box<dyn RegistryOperation>) -> Result<bool, RegistrarError>;
}

/// Runs a resource-provider [`Operation`] against the matching section of a
/// [`MasterRegistry`].
#[derive(Debug)]
pub struct AdaptedOperation {
    operation: Operation,
}

impl AdaptedOperation {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }
}

impl RegistryOperation for AdaptedOperation {
    fn perform(&mut self, registry: &mut MasterRegistry) -> Result<bool, OperationError> {
        self.operation
            .perform(&mut registry.resource_provider_registry)
    }
}

/// [`Registrar`] backed by an external [`MasterRegistrar`].
pub struct MasterBackedRegistrar {
    master: Arc<dyn MasterRegistrar>,
}

impl MasterBackedRegistrar {
    pub fn new(master: Arc<dyn MasterRegistrar>) -> Self {
        Self { master }
    }
}

#[async_trait]
impl Registrar for MasterBackedRegistrar {
    /// Nothing to load: the external registrar recovers its own registry.
    async fn recover(&self) -> Result<(), RegistrarError> {
        Ok(())
    }

    #[instrument(skip(self))]
    async fn apply(&self, operation: Operation) -> Result<bool, RegistrarError> {
        debug!("Delegating to master registrar");
        self.master
            .apply(Box::new(AdaptedOperation::new(operation)))
            .await
    }

    /// Nothing to stop: the external registrar owns its own lifecycle.
    async fn shutdown(self: Box<Self>) -> Result<(), RegistrarError> {
        Ok(())
    }
}
