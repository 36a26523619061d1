//! `apiextensions.sortie.dev/v1` resource definitions.

use serde::Deserialize;
use serde_json::Value;

use crate::error::FieldError;
use crate::internal::{self, Scope};

pub const API_VERSION: &str = "apiextensions.sortie.dev/v1";

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
    pub scope: Option<Scope>,
    #[serde(default)]
    pub names: Names,
    #[serde(default)]
    pub versions: Vec<Version>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub name: String,
    pub served: bool,
    pub storage: bool,
    #[serde(default)]
    pub schema: Option<Validation>,
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
    pub fn set_defaults(&mut self) {
        let names = &mut self.spec.names;
        if names.singular.is_none() && !names.kind.is_empty() {
            names.singular = Some(names.kind.to_lowercase());
        }
        if names.list_kind.is_none() && !names.kind.is_empty() {
            names.list_kind = Some(format!("{}List", names.kind));
        }
    }

    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.spec.scope.is_none() {
            errors.push(FieldError::required("spec.scope"));
        }
        errors
    }

    pub fn into_internal(self) -> internal::CustomResourceDefinition {
        let spec = self.spec;
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
            versions: spec
                .versions
                .into_iter()
                .map(|v| internal::DefinitionVersion {
                    name: v.name,
                    served: v.served,
                    storage: v.storage,
                    schema: v.schema.and_then(|s| s.open_api_v3_schema),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_is_required() {
        let doc = r#"
metadata:
  name: widgets.example.sortie.dev
spec:
  group: example.sortie.dev
  names:
    kind: Widget
    plural: widgets
  versions:
    - name: v1
      served: true
      storage: true
"#;
        let mut crd: CustomResourceDefinition = serde_yaml::from_str(doc).unwrap();
        crd.set_defaults();
        let errors = crd.validate();
        assert_eq!(errors, vec![FieldError::required("spec.scope")]);
        assert_eq!(crd.spec.names.list_kind.as_deref(), Some("WidgetList"));
    }

    #[test]
    fn test_served_and_storage_must_be_explicit() {
        let doc = r#"
spec:
  group: example.sortie.dev
  versions:
    - name: v1
"#;
        assert!(serde_yaml::from_str::<CustomResourceDefinition>(doc).is_err());
    }
}
