//! Version-independent representation of a resource definition.
//!
//! Every served apiVersion converts into this form. It is also the wire shape
//! the control plane accepts on `POST /definitions`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether instances of a resource live inside a namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Namespaced,
    Cluster,
}

impl Scope {
    pub fn is_namespaced(&self) -> bool {
        matches!(self, Scope::Namespaced)
    }
}

/// Naming information for a resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Names {
    pub plural: String,
    pub singular: String,
    pub kind: String,
    pub list_kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_names: Vec<String>,
}

/// One version of a resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionVersion {
    pub name: String,
    pub served: bool,
    pub storage: bool,
    /// OpenAPI v3 schema for objects of this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Canonical resource definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomResourceDefinition {
    pub name: String,
    pub group: String,
    pub scope: Scope,
    pub names: Names,
    pub versions: Vec<DefinitionVersion>,
}

impl CustomResourceDefinition {
    /// Look up a version by name.
    pub fn version(&self, name: &str) -> Option<&DefinitionVersion> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Returns true if `version` exists and is served.
    pub fn serves(&self, version: &str) -> bool {
        self.version(version).is_some_and(|v| v.served)
    }

    /// The single version objects are persisted as.
    pub fn storage_version(&self) -> Option<&DefinitionVersion> {
        self.versions.iter().find(|v| v.storage)
    }
}
