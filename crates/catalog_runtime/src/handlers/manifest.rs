use std::fs;
use std::path::{Path, PathBuf};

use catalog_core::contract::{ArtifactCatalog, ArtifactLocation, PublishedArtifacts};
use serde::{Deserialize, Serialize};

use crate::handlers::render::RenderedTemplate;

pub const MANIFEST_SCHEMA_VERSION: &str = "v1";

/// Hand-off record for product assembly, written after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishManifest {
    pub schema_version: String,
    pub product_version: String,
    pub seed_bucket: String,
    pub workspace: ArtifactLocation,
    pub artifacts: ArtifactCatalog,
    pub template_path: PathBuf,
    pub artifact_versions: Vec<String>,
    pub generated_at: String,
}

impl PublishManifest {
    pub fn new(
        product_version: impl Into<String>,
        published: &PublishedArtifacts,
        template: &RenderedTemplate,
        generated_at: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            product_version: product_version.into(),
            seed_bucket: published.workspace.container.clone(),
            workspace: published.workspace.clone(),
            artifacts: published.catalog.clone(),
            template_path: template.path.clone(),
            artifact_versions: template.artifact_versions.clone(),
            generated_at: generated_at.into(),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|error| format!("failed to create manifest directory: {error}"))?;
        }
        let body = serde_json::to_vec_pretty(self)
            .map_err(|error| format!("failed to serialize publish manifest: {error}"))?;
        fs::write(path, body).map_err(|error| {
            format!(
                "failed to write publish manifest '{}': {error}",
                path.display()
            )
        })
    }
}
