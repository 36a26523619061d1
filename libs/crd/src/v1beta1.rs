//! `apiextensions.sortie.dev/v1beta1` resource definitions.
//!
//! The beta shape allows a single legacy `version` field and one top-level
//! `validation` schema that applies to every version.

use serde::Deserialize;
use serde_json::Value;

use crate::error::FieldError;
use crate::internal::{self, Scope};

pub const API_VERSION: &str = "apiextensions.sortie.dev/v1beta1";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomResourceDefinition {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: Spec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub names: Names,
    #[serde(default)]
    pub validation: Option<Validation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub name: String,
    #[serde(default = "default_served")]
    pub served: bool,
    #[serde(default)]
    pub storage: bool,
    #[serde(default)]
    pub schema: Option<Validation>,
}

fn default_served() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Names {
    #[serde(default)]
    pub plural: String,
    #[serde(default)]
    pub singular: Option<String>,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub list_kind: Option<String>,
    #[serde(default)]
    pub short_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Validation {
    #[serde(rename = "openAPIV3Schema")]
    pub open_api_v3_schema: Option<Value>,
}

impl CustomResourceDefinition {
    /// Fill beta-specific defaults.
    pub fn set_defaults(&mut self) {
        let spec = &mut self.spec;

        if spec.scope.is_none() {
            spec.scope = Some(Scope::Namespaced);
        }

        if spec.versions.is_empty() {
            if let Some(version) = &spec.version {
                spec.versions.push(Version {
                    name: version.clone(),
                    served: true,
                    storage: true,
                    schema: None,
                });
            }
        }

        if spec.names.singular.is_none() && !spec.names.kind.is_empty() {
            spec.names.singular = Some(spec.names.kind.to_lowercase());
        }
        if spec.names.list_kind.is_none() && !spec.names.kind.is_empty() {
            spec.names.list_kind = Some(format!("{}List", spec.names.kind));
        }
    }

    /// Checks that only make sense against the beta shape.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let spec = &self.spec;

        if let (Some(version), Some(first)) = (&spec.version, spec.versions.first()) {
            if version != &first.name {
                errors.push(FieldError::invalid(
                    "spec.version",
                    version,
                    "must match the first version in spec.versions",
                ));
            }
        }

        let top_level = spec
            .validation
            .as_ref()
            .is_some_and(|v| v.open_api_v3_schema.is_some());
        if top_level {
            for (i, version) in spec.versions.iter().enumerate() {
                if version.schema.is_some() {
                    errors.push(FieldError::invalid(
                        format!("spec.versions[{i}].schema"),
                        &version.name,
                        "per-version schemas may not be set when top-level spec.validation is set",
                    ));
                }
            }
        }

        errors
    }

    /// Convert into the version-independent form.
    pub fn into_internal(self) -> internal::CustomResourceDefinition {
        let spec = self.spec;
        let shared_schema = spec.validation.and_then(|v| v.open_api_v3_schema);

        let versions = spec
            .versions
            .into_iter()
            .map(|v| internal::DefinitionVersion {
                name: v.name,
                served: v.served,
                storage: v.storage,
                schema: v
                    .schema
                    .and_then(|s| s.open_api_v3_schema)
                    .or_else(|| shared_schema.clone()),
            })
            .collect();

        internal::CustomResourceDefinition {
            name: self.metadata.name,
            group: spec.group,
            scope: spec.scope.unwrap_or_default(),
            names: internal::Names {
                plural: spec.names.plural,
                singular: spec.names.singular.unwrap_or_default(),
                kind: spec.names.kind,
                list_kind: spec.names.list_kind.unwrap_or_default(),
                short_names: spec.names.short_names,
            },
            versions,
        }
    }
}
