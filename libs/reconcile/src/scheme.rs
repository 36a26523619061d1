//! Registry of the typed kinds a manager knows about.

use std::collections::BTreeMap;

use sortie_client::{Namespace, Resource, ResourceType};

use crate::error::ReconcileError;

/// Maps `(group, kind)` to the resource types registered for it.
///
/// A fresh scheme already knows the built-in kinds.
#[derive(Debug, Clone)]
pub struct Scheme {
    kinds: BTreeMap<(String, String), Vec<ResourceType>>,
}

impl Default for Scheme {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheme {
    pub fn new() -> Self {
        let mut scheme = Self::empty();
        scheme.insert(Namespace::resource_type());
        scheme
    }

    /// A scheme without built-in kinds.
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    /// Register a typed kind.
    pub fn register<K: Resource>(&mut self) -> Result<(), ReconcileError> {
        self.register_type(K::resource_type())
    }

    /// Register a kind by its type information.
    ///
    /// Registering the same version twice is a no-op. A second version of
    /// a kind must agree on plural and scope.
    pub fn register_type(&mut self, resource_type: ResourceType) -> Result<(), ReconcileError> {
        let key = (resource_type.group.clone(), resource_type.kind.clone());
        if let Some(existing) = self.kinds.get(&key).and_then(|versions| versions.first()) {
            if existing.plural != resource_type.plural || existing.scope != resource_type.scope {
                return Err(ReconcileError::SchemeConflict {
                    group: resource_type.group,
                    kind: resource_type.kind,
                    existing: existing.to_string(),
                });
            }
        }
        self.insert(resource_type);
        Ok(())
    }

    fn insert(&mut self, resource_type: ResourceType) {
        let versions = self
            .kinds
            .entry((resource_type.group.clone(), resource_type.kind.clone()))
            .or_default();
        if !versions.iter().any(|v| v.version == resource_type.version) {
            versions.push(resource_type);
        }
    }

    pub fn is_registered<K: Resource>(&self) -> bool {
        self.contains(&K::resource_type())
    }

    /// True if this exact group, version and kind is registered.
    pub fn contains(&self, resource_type: &ResourceType) -> bool {
        self.kinds
            .get(&(resource_type.group.clone(), resource_type.kind.clone()))
            .is_some_and(|versions| versions.iter().any(|v| v == resource_type))
    }

    /// Every registered version of a kind.
    pub fn versions(&self, group: &str, kind: &str) -> &[ResourceType] {
        self.kinds
            .get(&(group.to_string(), kind.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &ResourceType> {
        self.kinds.values().flatten()
    }
}
