use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use catalog_core::contract::{ArtifactCatalog, ArtifactLocation};
use catalog_core::error::RenderError;
use catalog_core::template::{parse_base_template, render_document, to_template_bytes};
use serde_json::Value;

/// A fully resolved product template written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTemplate {
    pub path: PathBuf,
    pub document: Value,
    /// Version identifiers of the catalog entries, in artifact name order.
    pub artifact_versions: Vec<String>,
}

pub fn load_base_template(path: &Path) -> Result<Value, RenderError> {
    let raw = fs::read_to_string(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_base_template(&raw)
}

/// Renders the product template and writes it to `output_path`.
///
/// The file is replaced atomically and parsed back before returning, so the
/// returned path always holds a valid document.
pub fn render_template(
    catalog: &ArtifactCatalog,
    workspace: &ArtifactLocation,
    base_shape: &Value,
    output_path: &Path,
) -> Result<RenderedTemplate, RenderError> {
    let document = render_document(base_shape, catalog, workspace)?;
    let bytes = to_template_bytes(&document)?;

    write_atomically(output_path, &bytes)?;
    verify_written(output_path, &document)?;

    tracing::info!(
        path = %output_path.display(),
        bytes = bytes.len(),
        artifacts = catalog.len(),
        "product_template_written"
    );

    Ok(RenderedTemplate {
        path: output_path.to_path_buf(),
        document,
        artifact_versions: catalog.version_identifiers(),
    })
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let io_error = |source: std::io::Error| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&directory).map_err(io_error)?;

    let mut staged = tempfile::NamedTempFile::new_in(&directory).map_err(io_error)?;
    staged.write_all(bytes).map_err(io_error)?;
    staged.as_file().sync_all().map_err(io_error)?;
    staged.persist(path).map_err(|error| io_error(error.error))?;
    Ok(())
}

fn verify_written(path: &Path, expected: &Value) -> Result<(), RenderError> {
    let raw = fs::read(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: Value = serde_json::from_slice(&raw).map_err(|error| RenderError::Verification {
        path: path.to_path_buf(),
        reason: format!("not valid JSON: {error}"),
    })?;

    if &parsed != expected {
        return Err(RenderError::Verification {
            path: path.to_path_buf(),
            reason: "written document differs from the rendered document".to_string(),
        });
    }
    Ok(())
}
