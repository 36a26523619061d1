//! Semantic validation of canonical resource definitions.
//!
//! Validation never stops at the first problem: every rule runs and the
//! caller receives the full list.

use std::collections::BTreeSet;

use crate::error::FieldError;
use crate::internal::CustomResourceDefinition;
use crate::schema::SchemaValidator;

const DNS_LABEL_MAX: usize = 63;
const DNS_SUBDOMAIN_MAX: usize = 253;

/// Validate a canonical definition.
pub fn validate(crd: &CustomResourceDefinition) -> Vec<FieldError> {
    let mut errors = Vec::new();

    validate_identity(crd, &mut errors);
    validate_names(crd, &mut errors);
    validate_versions(crd, &mut errors);

    errors
}

fn validate_identity(crd: &CustomResourceDefinition, errors: &mut Vec<FieldError>) {
    if crd.group.is_empty() {
        errors.push(FieldError::required("spec.group"));
    } else if !is_dns_subdomain(&crd.group) || !crd.group.contains('.') {
        errors.push(FieldError::invalid(
            "spec.group",
            &crd.group,
            "should be a domain with at least one dot",
        ));
    }

    if crd.name.is_empty() {
        errors.push(FieldError::required("metadata.name"));
        return;
    }

    let expected = format!("{}.{}", crd.names.plural, crd.group);
    if crd.name != expected {
        errors.push(FieldError::invalid(
            "metadata.name",
            &crd.name,
            format!("must be spec.names.plural+\".\"+spec.group ({expected:?})"),
        ));
    }
}

fn validate_names(crd: &CustomResourceDefinition, errors: &mut Vec<FieldError>) {
    let names = &crd.names;

    check_label("spec.names.plural", &names.plural, errors);
    check_label("spec.names.singular", &names.singular, errors);

    if names.kind.is_empty() {
        errors.push(FieldError::required("spec.names.kind"));
    } else if !names.kind.starts_with(|c: char| c.is_ascii_uppercase()) {
        errors.push(FieldError::invalid(
            "spec.names.kind",
            &names.kind,
            "must start with an upper-case letter",
        ));
    }

    if names.list_kind.is_empty() {
        errors.push(FieldError::required("spec.names.listKind"));
    } else if names.list_kind == names.kind {
        errors.push(FieldError::invalid(
            "spec.names.listKind",
            &names.list_kind,
            "must differ from spec.names.kind",
        ));
    }

    let mut seen = BTreeSet::new();
    for (i, short) in names.short_names.iter().enumerate() {
        let field = format!("spec.names.shortNames[{i}]");
        if !is_dns_label(short) {
            errors.push(FieldError::invalid(&field, short, "must be a lower-case DNS label"));
        }
        if !seen.insert(short.as_str()) {
            errors.push(FieldError::duplicate(field, short));
        }
    }
}

fn validate_versions(crd: &CustomResourceDefinition, errors: &mut Vec<FieldError>) {
    if crd.versions.is_empty() {
        errors.push(FieldError::required("spec.versions"));
        return;
    }

    let mut seen = BTreeSet::new();
    let mut storage = 0;

    for (i, version) in crd.versions.iter().enumerate() {
        let field = format!("spec.versions[{i}]");

        if !is_dns_label(&version.name)
            || !version.name.starts_with(|c: char| c.is_ascii_lowercase())
        {
            errors.push(FieldError::invalid(
                format!("{field}.name"),
                &version.name,
                "must be a DNS label starting with a letter",
            ));
        }
        if !seen.insert(version.name.as_str()) {
            errors.push(FieldError::duplicate(format!("{field}.name"), &version.name));
        }

        if version.storage {
            storage += 1;
            if !version.served {
                errors.push(FieldError::invalid(
                    format!("{field}.served"),
                    "false",
                    "the storage version must be served",
                ));
            }
        }

        if let Some(schema) = &version.schema {
            let schema_field = format!("{field}.schema.openAPIV3Schema");
            match schema.get("type").and_then(|t| t.as_str()) {
                Some("object") => {}
                Some(other) => errors.push(FieldError::invalid(
                    format!("{schema_field}.type"),
                    other,
                    "must be object at the root",
                )),
                None => errors.push(FieldError::required(format!("{schema_field}.type"))),
            }
            if let Err(e) = SchemaValidator::compile(schema) {
                errors.push(FieldError::invalid(schema_field, &version.name, e));
            }
        }
    }

    if storage != 1 {
        errors.push(FieldError::invalid(
            "spec.versions",
            &storage.to_string(),
            "must have exactly one version marked as storage version",
        ));
    }
}

fn check_label(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    if value.is_empty() {
        errors.push(FieldError::required(field));
    } else if !is_dns_label(value) {
        errors.push(FieldError::invalid(field, value, "must be a lower-case DNS label"));
    }
}

/// RFC 1123 label: lower-case alphanumerics and '-', alphanumeric at both ends.
pub fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= DNS_LABEL_MAX
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

/// RFC 1123 subdomain: dot-separated labels.
pub fn is_dns_subdomain(value: &str) -> bool {
    !value.is_empty() && value.len() <= DNS_SUBDOMAIN_MAX && value.split('.').all(is_dns_label)
}
