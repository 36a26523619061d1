//! Integration tests for loading definitions from disk.

use std::fs;

use sortie_crd::{load_dir, load_paths, CrdError};
use tempfile::TempDir;

const WIDGET: &str = r#"
apiVersion: apiextensions.sortie.dev/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.sortie.dev
spec:
  group: example.sortie.dev
  scope: Namespaced
  names:
    kind: Widget
    plural: widgets
  versions:
    - name: v1
      served: true
      storage: true
"#;

const GADGET: &str = r#"
apiVersion: apiextensions.sortie.dev/v1beta1
kind: CustomResourceDefinition
metadata:
  name: gadgets.example.sortie.dev
spec:
  group: example.sortie.dev
  version: v1alpha1
  names:
    kind: Gadget
    plural: gadgets
"#;

#[test]
fn test_load_dir_reads_nested_files_in_order() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("b-widget.yaml"), WIDGET).unwrap();
    fs::write(dir.path().join("nested/a-gadget.yml"), GADGET).unwrap();
    fs::write(dir.path().join("README.md"), "not a definition").unwrap();

    let crds = load_dir(dir.path()).unwrap();
    let names: Vec<&str> = crds.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["widgets.example.sortie.dev", "gadgets.example.sortie.dev"]
    );
}

#[test]
fn test_load_paths_accepts_files_and_directories() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("gadget.yaml");
    fs::write(&file, GADGET).unwrap();
    let sub = dir.path().join("more");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("widget.yaml"), WIDGET).unwrap();

    let crds = load_paths(&[file, sub]).unwrap();
    assert_eq!(crds.len(), 2);
}

#[test]
fn test_duplicate_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("one.yaml"), WIDGET).unwrap();
    fs::write(dir.path().join("two.yaml"), WIDGET).unwrap();

    let err = load_paths(&[dir.path()]).unwrap_err();
    assert!(matches!(err, CrdError::Duplicate(name) if name == "widgets.example.sortie.dev"));
}

#[test]
fn test_missing_path_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = load_paths(&[dir.path().join("absent")]).unwrap_err();
    assert!(matches!(err, CrdError::Io { .. }));
}

#[test]
fn test_invalid_file_reports_path_and_field_errors() {
    let dir = TempDir::new().unwrap();
    let broken = WIDGET.replace("kind: Widget", "kind: widget");
    fs::write(dir.path().join("broken.yaml"), broken).unwrap();

    let err = load_dir(dir.path()).unwrap_err();
    assert!(err.to_string().contains("broken.yaml"));
    let errors = err.field_errors().expect("validation errors");
    assert!(errors.has_field("spec.names.kind"));
}
