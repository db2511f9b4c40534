//! Manifest Materializer
//!
//! Renders the deployment template for one run by literal placeholder
//! substitution. Values are inserted verbatim, without escaping.

use crate::error::HarnessError;
use std::path::{Path, PathBuf};
use tracing::info;

pub const IMAGE_PLACEHOLDER: &str = "*IMAGE_NAME*";
pub const SUBDOMAIN_PLACEHOLDER: &str = "*SUBDOMAIN*";
pub const PORT_PLACEHOLDER: &str = "*NODE_PORT*";

/// Replace every placeholder occurrence in `template`.
pub fn render(template: &str, image_ref: &str, run_id: &str, port: u16) -> String {
    template
        .replace(IMAGE_PLACEHOLDER, image_ref)
        .replace(SUBDOMAIN_PLACEHOLDER, run_id)
        .replace(PORT_PLACEHOLDER, &port.to_string())
}

/// Output path for a run: `<output_dir>/<run_id>-<template file name>`.
pub fn output_path(template: &Path, output_dir: &Path, run_id: &str) -> Result<PathBuf, HarnessError> {
    let file_name = template
        .file_name()
        .ok_or_else(|| HarnessError::Manifest {
            path: template.to_path_buf(),
            reason: "template path has no file name".to_string(),
        })?
        .to_string_lossy();
    Ok(output_dir.join(format!("{}-{}", run_id, file_name)))
}

/// Read `template`, render it and write the run-scoped copy. Returns the written path.
pub fn materialize(
    template: &Path,
    output_dir: &Path,
    run_id: &str,
    image_ref: &str,
    port: u16,
) -> Result<PathBuf, HarnessError> {
    let source = std::fs::read_to_string(template).map_err(|e| HarnessError::Manifest {
        path: template.to_path_buf(),
        reason: format!("cannot read template: {}", e),
    })?;

    let destination = output_path(template, output_dir, run_id)?;
    let rendered = render(&source, image_ref, run_id, port);
    std::fs::write(&destination, rendered).map_err(|e| HarnessError::Manifest {
        path: destination.clone(),
        reason: format!("cannot write manifest: {}", e),
    })?;

    info!(
        template = %template.display(),
        manifest = %destination.display(),
        "Materialized deployment manifest"
    );
    Ok(destination)
}
