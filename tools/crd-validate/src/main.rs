//! sortie-crd-validate
//!
//! Loads every resource definition under the given files or directories and
//! reports each one that fails, with all of its field errors. Exits with
//! status 1 if anything failed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use sortie_crd::{CrdError, CustomResourceDefinition};
use walkdir::WalkDir;

#[derive(Debug, Parser)]
#[command(name = "sortie-crd-validate", version, about = "Validate resource definition files")]
struct Cli {
    /// Definition files or directories to walk.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Print the sha256 of each definition's canonical JSON form.
    #[arg(long)]
    digest: bool,
}

/// Result of checking every file.
#[derive(Debug, Default)]
struct Summary {
    /// Definition name to the file that defined it.
    loaded: BTreeMap<String, PathBuf>,
    failures: Vec<String>,
}

fn definition_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
        let is_definition = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json"));
        if entry.file_type().is_file() && is_definition {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn describe(err: &CrdError) -> String {
    let Some(errors) = err.field_errors() else {
        return err.to_string();
    };
    let mut out = format!("{} error(s)", errors.len());
    for error in errors.iter() {
        out.push_str(&format!("\n    - {error}"));
    }
    out
}

fn digest(crd: &CustomResourceDefinition) -> Result<String> {
    let json = serde_json::to_vec(crd).context("failed to encode definition")?;
    Ok(hex::encode(Sha256::digest(&json)))
}

fn validate(paths: &[PathBuf], show_digest: bool) -> Result<Summary> {
    let mut summary = Summary::default();

    for root in paths {
        for file in definition_files(root)? {
            let definitions = match sortie_crd::load_file(&file) {
                Ok(definitions) => definitions,
                Err(e) => {
                    summary
                        .failures
                        .push(format!("{}: {}", file.display(), describe(&e)));
                    continue;
                }
            };

            for crd in definitions {
                if let Some(first) = summary.loaded.get(&crd.name) {
                    summary.failures.push(format!(
                        "{}: {:?} is already defined in {}",
                        file.display(),
                        crd.name,
                        first.display()
                    ));
                    continue;
                }

                if show_digest {
                    println!("ok   {} ({}) sha256={}", crd.name, file.display(), digest(&crd)?);
                } else {
                    println!("ok   {} ({})", crd.name, file.display());
                }
                summary.loaded.insert(crd.name, file.clone());
            }
        }
    }

    Ok(summary)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let summary = validate(&cli.paths, cli.digest)?;

    for failure in &summary.failures {
        eprintln!("FAIL {failure}");
    }

    if summary.failures.is_empty() {
        println!("OK: {} resource definition(s) valid", summary.loaded.len());
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "{} failure(s), {} resource definition(s) valid",
            summary.failures.len(),
            summary.loaded.len()
        );
        Ok(ExitCode::FAILURE)
    }
}
