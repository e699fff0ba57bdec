//! # Registrar Errors
//!
//! Three disjoint failure classes flow through the registrar:
//!
//! - [`OperationError`]: a domain rejection. Local to one operation; the registrar
//!   keeps running and sibling operations in the same batch are unaffected.
//! - [`StoreError`]: the storage backend failed. During a commit this is fatal and
//!   turns into [`RegistrarError::Aborted`].
//! - [`RegistrarError::NotRecovered`]: a usage error, `apply` before `recover`.
//!
//! All of them are `Clone` so a single cached outcome (a failed recovery, the
//! sticky abort message) can be handed to every waiter.

use crate::model::ResourceProviderId;
use thiserror::Error;

/// Rejections raised by an [`Operation`](crate::operation::Operation) itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("Resource provider already admitted: {0}")]
    AlreadyAdmitted(ResourceProviderId),

    #[error("Attempted to remove an unknown resource provider: {0}")]
    UnknownResourceProvider(ResourceProviderId),
}

/// Failures reported by a [`Storage`](crate::store::Storage) backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),

    /// The write was abandoned before its outcome was known.
    #[error("discarded")]
    Discarded,

    #[error("failed to decode record: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Errors returned from [`Registrar::recover`](crate::registrar::Registrar::recover)
/// and [`Registrar::apply`](crate::registrar::Registrar::apply).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrarError {
    #[error("Attempted to apply the operation before recovering")]
    NotRecovered,

    #[error(transparent)]
    Rejected(#[from] OperationError),

    /// The registrar stopped committing. Permanent for the life of the registrar.
    #[error("{0}")]
    Aborted(String),

    #[error("Failed to recover registry: {0}")]
    Recovery(StoreError),

    #[error("Registrar closed")]
    ActorClosed,

    #[error("Registrar dropped response channel")]
    ActorDropped,

    #[error("Registrar task failed: {0}")]
    ActorFailed(String),
}

impl RegistrarError {
    /// True for a domain rejection of one operation; every other variant is systemic.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RegistrarError::Rejected(_))
    }
}
