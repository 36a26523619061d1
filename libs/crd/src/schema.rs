//! OpenAPI schema compilation for resource versions.

use std::fmt;

use serde_json::Value;

use crate::internal::DefinitionVersion;

/// A compiled schema for one resource version.
pub struct SchemaValidator {
    inner: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile an OpenAPI v3 object schema.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let inner = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        Ok(Self { inner })
    }

    /// Validate an instance, returning every violation found.
    pub fn validate(&self, instance: &Value) -> Vec<String> {
        self.inner
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect()
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.inner.is_valid(instance)
    }
}

/// Compile the schema of one definition version, if it has one.
pub fn compile_schema(version: &DefinitionVersion) -> Result<Option<SchemaValidator>, String> {
    version.schema.as_ref().map(SchemaValidator::compile).transpose()
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}
