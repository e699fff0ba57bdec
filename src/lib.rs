//! # Resource Provider Registrar
//!
//! Durably tracks which resource providers have been admitted to the cluster.
//! Concurrent admit/remove requests are serialized into crash-safe updates of a
//! single persisted registry document.
//!
//! ## Architecture Overview
//!
//! 1. **Operations** ([`Operation`]) - `Admit` / `Remove`, pure functions over a [`Registry`]
//! 2. **Runtime** ([`RegistrarActor`]) - recovery, batching and compare-and-swap commits
//! 3. **Interface** ([`Registrar`]) - `recover` + `apply`, with two backends:
//!    - [`GenericRegistrar`] persists through a [`Storage`] backend
//!    - [`MasterBackedRegistrar`] delegates to an external composite registrar
//!
//! ## Batching
//!
//! At most one write is in flight per registrar. Operations arriving while a write
//! is outstanding are queued and committed together in the next write, each still
//! resolved with its own outcome.
//!
//! ## Failure Model
//!
//! - A rejected operation (duplicate admit, unknown remove) fails alone. Its batch
//!   is still written.
//! - A failed, discarded or conflicting write is fatal. The registrar fails that
//!   batch and every operation after it with the same
//!   [`RegistrarError::Aborted`] message, and never writes again.
//!
//! ## Testing
//!
//! See the [`mock`] module for a scriptable storage backend and an in-memory
//! composite registrar.

pub mod actor;
pub mod config;
pub mod error;
pub mod master;
pub mod message;
pub mod mock;
pub mod model;
pub mod operation;
pub mod registrar;
pub mod store;
pub mod tracing;

pub use actor::RegistrarActor;
pub use config::RegistrarConfig;
pub use error::{OperationError, RegistrarError, StoreError};
pub use master::{
    AdaptedOperation, MasterBackedRegistrar, MasterRegistrar, MasterRegistry, RegistryOperation,
};
pub use message::{AppliedOperation, PendingOperation, RegistrarRequest, Response};
pub use model::{Registry, ResourceProvider, ResourceProviderId};
pub use operation::Operation;
pub use registrar::{GenericRegistrar, Registrar};
pub use store::{InMemoryStorage, State, Storage, Variable};
