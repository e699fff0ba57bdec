//! Persisted registry types.
//!
//! The [`Registry`] is the document the registrar writes on every commit. At this
//! layer a [`ResourceProvider`] carries nothing but its identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a resource provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceProviderId(pub String);

impl ResourceProviderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceProviderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceProviderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An admitted resource provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProvider {
    pub id: ResourceProviderId,
}

impl ResourceProvider {
    pub fn new(id: ResourceProviderId) -> Self {
        Self { id }
    }
}

/// The ordered collection of admitted resource providers.
///
/// Identifiers are unique within `resource_providers`; the only writers are the
/// [`Operation`](crate::operation::Operation) variants, which preserve that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub resource_providers: Vec<ResourceProvider>,
}

impl Registry {
    pub fn position(&self, id: &ResourceProviderId) -> Option<usize> {
        self.resource_providers.iter().position(|rp| &rp.id == id)
    }

    pub fn contains(&self, id: &ResourceProviderId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.resource_providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_providers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResourceProviderId> {
        self.resource_providers.iter().map(|rp| &rp.id)
    }
}
