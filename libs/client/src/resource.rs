//! Typed resources.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sortie_crd::Scope;

use crate::meta::ObjectMeta;

/// Group segment used in paths for resources with an empty group.
pub const CORE_GROUP_SEGMENT: &str = "core";

/// A type the client can read and write.
///
/// Implement with [`crate::define_resource!`] or by hand for types without
/// the usual `spec`/`status` layout.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const GROUP: &'static str;
    const VERSION: &'static str;
    const KIND: &'static str;
    const PLURAL: &'static str;
    const SCOPE: Scope;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn resource_type() -> ResourceType {
        ResourceType {
            group: Self::GROUP.to_string(),
            version: Self::VERSION.to_string(),
            kind: Self::KIND.to_string(),
            plural: Self::PLURAL.to_string(),
            scope: Self::SCOPE,
        }
    }
}

/// Group, version, kind and plural of a served resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub scope: Scope,
}

impl ResourceType {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Collection path, e.g. `/apis/example.sortie.dev/v1/widgets`.
    pub fn collection_path(&self) -> String {
        let group = if self.group.is_empty() {
            CORE_GROUP_SEGMENT
        } else {
            &self.group
        };
        format!("/apis/{}/{}/{}", group, self.version, self.plural)
    }

    /// True if both describe the same group and plural, regardless of version.
    pub fn same_resource(&self, group: &str, plural: &str) -> bool {
        self.group == group && self.plural == plural
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.plural, self.version)
        } else {
            write!(f, "{}.{}/{}", self.plural, self.group, self.version)
        }
    }
}

/// Built-in cluster-scoped namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
        }
    }
}

impl Resource for Namespace {
    const GROUP: &'static str = "";
    const VERSION: &'static str = "v1";
    const KIND: &'static str = "Namespace";
    const PLURAL: &'static str = "namespaces";
    const SCOPE: Scope = Scope::Cluster;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_group_paths() {
        let rt = Namespace::resource_type();
        assert_eq!(rt.api_version(), "v1");
        assert_eq!(rt.collection_path(), "/apis/core/v1/namespaces");
        assert_eq!(rt.to_string(), "namespaces/v1");
    }
}
