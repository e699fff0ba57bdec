//! # Registry Operations
//!
//! An [`Operation`] is the unit of work callers hand to a registrar. It is a tagged
//! variant dispatched through [`Operation::perform`], which either reports whether
//! the registry was mutated or rejects the request with an [`OperationError`].
//!
//! New mutation kinds are added as variants here; both backends pick them up
//! without change because they only ever call `perform`.

use crate::error::OperationError;
use crate::model::{Registry, ResourceProvider, ResourceProviderId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Adds a provider. Rejected if the identifier is already present.
    Admit(ResourceProviderId),
    /// Erases a provider. Rejected if the identifier is not present.
    Remove(ResourceProviderId),
}

impl Operation {
    pub fn admit(id: impl Into<ResourceProviderId>) -> Self {
        Operation::Admit(id.into())
    }

    pub fn remove(id: impl Into<ResourceProviderId>) -> Self {
        Operation::Remove(id.into())
    }

    pub fn id(&self) -> &ResourceProviderId {
        match self {
            Operation::Admit(id) | Operation::Remove(id) => id,
        }
    }

    /// Applies the operation to `registry`.
    ///
    /// Returns `Ok(true)` when the registry was mutated. A rejected operation leaves
    /// `registry` untouched.
    pub fn perform(&self, registry: &mut Registry) -> Result<bool, OperationError> {
        match self {
            Operation::Admit(id) => {
                if registry.contains(id) {
                    return Err(OperationError::AlreadyAdmitted(id.clone()));
                }
                registry
                    .resource_providers
                    .push(ResourceProvider::new(id.clone()));
                Ok(true)
            }
            Operation::Remove(id) => {
                let pos = registry
                    .position(id)
                    .ok_or_else(|| OperationError::UnknownResourceProvider(id.clone()))?;
                registry.resource_providers.remove(pos);
                Ok(true)
            }
        }
    }
}
