//! # Registrar Interface
//!
//! [`Registrar`] is the contract both backends satisfy:
//!
//! - [`GenericRegistrar`] persists the registry itself through a [`Storage`]
//!   backend, via a [`RegistrarActor`].
//! - [`MasterBackedRegistrar`] runs operations inside an external composite
//!   registrar that owns persistence.
//!
//! Pick one with [`with_storage`] or [`with_master`].
//!
//! ```rust
//! use provider_registrar::{registrar, InMemoryStorage, Operation, Registrar};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registrar = registrar::with_storage(Arc::new(InMemoryStorage::new()));
//!     registrar.recover().await.unwrap();
//!
//!     assert_eq!(registrar.apply(Operation::admit("rp-1")).await, Ok(true));
//!     assert!(registrar.apply(Operation::admit("rp-1")).await.is_err());
//!
//!     registrar.shutdown().await.unwrap();
//! }
//! ```

use crate::actor::RegistrarActor;
use crate::config::RegistrarConfig;
use crate::error::RegistrarError;
use crate::master::{MasterBackedRegistrar, MasterRegistrar};
use crate::message::RegistrarRequest;
use crate::operation::Operation;
use crate::store::Storage;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// Common contract of the registrar backends.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Loads the persisted registry. Must be called before [`apply`](Self::apply).
    ///
    /// Idempotent: later calls return the outcome of the first one.
    async fn recover(&self) -> Result<(), RegistrarError>;

    /// Applies `operation`, resolving once its fate is durable.
    ///
    /// `Ok(true)` means the registry was mutated. A domain rejection comes back as
    /// [`RegistrarError::Rejected`]; anything else is systemic.
    async fn apply(&self, operation: Operation) -> Result<bool, RegistrarError>;

    /// Stops the registrar once the operations it already accepted are resolved.
    async fn shutdown(self: Box<Self>) -> Result<(), RegistrarError>;
}

/// Builds a registrar that persists the registry in `storage`.
///
/// Must be called from within a Tokio runtime.
pub fn with_storage(storage: Arc<dyn Storage>) -> Box<dyn Registrar> {
    Box::new(GenericRegistrar::new(storage))
}

/// Builds a registrar that delegates to an external composite registrar.
pub fn with_master(master: Arc<dyn MasterRegistrar>) -> Box<dyn Registrar> {
    Box::new(MasterBackedRegistrar::new(master))
}

/// Handle to a running [`RegistrarActor`].
///
/// Owns the actor task. [`shutdown`](Self::shutdown) closes the mailbox and waits
/// for the actor to finish the work it already accepted. Dropping the handle
/// closes the mailbox as well, but cannot wait.
pub struct GenericRegistrar {
    sender: mpsc::Sender<RegistrarRequest>,
    handle: JoinHandle<()>,
}

impl GenericRegistrar {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, RegistrarConfig::default())
    }

    /// Spawns the actor onto the current Tokio runtime.
    pub fn with_config(storage: Arc<dyn Storage>, config: RegistrarConfig) -> Self {
        let (actor, sender) = RegistrarActor::new(storage, &config);
        let handle = tokio::spawn(actor.run());
        Self { sender, handle }
    }

    /// Stops the actor and waits for it to exit.
    pub async fn shutdown(self) -> Result<(), RegistrarError> {
        info!("Shutting down registrar...");
        drop(self.sender);

        if let Err(e) = self.handle.await {
            error!("Registrar task failed: {:?}", e);
            return Err(RegistrarError::ActorFailed(format!("{:?}", e)));
        }

        info!("Registrar shutdown complete.");
        Ok(())
    }
}

#[async_trait]
impl Registrar for GenericRegistrar {
    #[instrument(skip(self))]
    async fn recover(&self) -> Result<(), RegistrarError> {
        debug!("Sending request");
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistrarRequest::Recover { respond_to })
            .await
            .map_err(|_| RegistrarError::ActorClosed)?;
        response.await.map_err(|_| RegistrarError::ActorDropped)?
    }

    #[instrument(skip(self))]
    async fn apply(&self, operation: Operation) -> Result<bool, RegistrarError> {
        debug!("Sending request");
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistrarRequest::Apply {
                operation,
                respond_to,
            })
            .await
            .map_err(|_| RegistrarError::ActorClosed)?;
        response.await.map_err(|_| RegistrarError::ActorDropped)?
    }

    async fn shutdown(self: Box<Self>) -> Result<(), RegistrarError> {
        GenericRegistrar::shutdown(*self).await
    }
}
