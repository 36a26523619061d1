//! Resource-definition loader.
//!
//! Turns a serialized, versioned resource-type definition into the canonical
//! [`CustomResourceDefinition`] the control plane understands:
//!
//! 1. Decode the YAML (or JSON) document and dispatch on `apiVersion`.
//! 2. Fill version-specific defaults.
//! 3. Convert to the version-independent internal form.
//! 4. Validate, aggregating every problem into one [`CrdError::Invalid`].

pub mod error;
pub mod internal;
mod loader;
pub mod schema;
pub mod v1;
pub mod v1beta1;
pub mod validation;

pub use error::{CrdError, FieldError, FieldErrorKind, FieldErrors};
pub use internal::{CustomResourceDefinition, DefinitionVersion, Names, Scope};
pub use loader::{load_dir, load_file, load_paths};
pub use schema::{compile_schema, SchemaValidator};

use serde::Deserialize;

/// The `kind` every definition document must declare.
pub const KIND: &str = "CustomResourceDefinition";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
}

/// Load a single definition document.
pub fn load(bytes: &[u8]) -> Result<CustomResourceDefinition, CrdError> {
    let value: serde_yaml::Value = serde_yaml::from_slice(bytes)?;
    decode(value)
}

/// Load every document of a multi-document YAML stream.
///
/// Empty documents are skipped.
pub fn load_all(bytes: &[u8]) -> Result<Vec<CustomResourceDefinition>, CrdError> {
    let mut definitions = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(bytes) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        definitions.push(decode(value)?);
    }
    Ok(definitions)
}

fn decode(value: serde_yaml::Value) -> Result<CustomResourceDefinition, CrdError> {
    let meta: TypeMeta = serde_yaml::from_value(value.clone())?;
    if meta.kind != KIND {
        return Err(CrdError::UnsupportedKind(meta.kind));
    }

    let (crd, mut errors) = match meta.api_version.as_str() {
        v1beta1::API_VERSION => {
            let mut doc: v1beta1::CustomResourceDefinition = serde_yaml::from_value(value)?;
            doc.set_defaults();
            let errors = doc.validate();
            (doc.into_internal(), errors)
        }
        v1::API_VERSION => {
            let mut doc: v1::CustomResourceDefinition = serde_yaml::from_value(value)?;
            doc.set_defaults();
            let errors = doc.validate();
            (doc.into_internal(), errors)
        }
        other => return Err(CrdError::UnsupportedVersion(other.to_string())),
    };

    errors.extend(validation::validate(&crd));
    if !errors.is_empty() {
        return Err(CrdError::Invalid {
            name: crd.name,
            errors: errors.into(),
        });
    }

    Ok(crd)
}
