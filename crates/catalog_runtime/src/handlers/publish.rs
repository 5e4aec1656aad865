use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_core::contract::{ArtifactCatalog, ArtifactLocation, PublishedArtifacts, SourceTree};
use catalog_core::error::PublishError;
use catalog_core::packaging::package_directory;
use catalog_core::storage_keys::artifact_object_key;

use crate::adapters::content_store::ContentStore;

/// Bounded exponential backoff for transient upload failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `failed_attempt` (1-based).
    pub fn backoff_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    pub container: String,
    pub key_prefix: String,
    pub retry: RetryPolicy,
}

/// Lists the immediate subdirectories of `root` in name order. Plain files
/// next to them are ignored.
pub fn discover_source_trees(root: &Path) -> Result<Vec<PathBuf>, PublishError> {
    let invalid = |reason: String| PublishError::InvalidSource {
        path: root.to_path_buf(),
        reason,
    };

    let mut sources = Vec::new();
    for entry in fs::read_dir(root).map_err(|error| invalid(error.to_string()))? {
        let entry = entry.map_err(|error| invalid(error.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            sources.push(path);
        } else {
            tracing::debug!(path = %path.display(), "skipping non-directory source entry");
        }
    }
    sources.sort();
    Ok(sources)
}

/// Publishes every source tree and returns the resulting catalog.
///
/// All sources are validated and checked for name collisions before anything
/// is uploaded; the first failure aborts the run and no catalog is returned.
pub fn publish_catalog(
    sources: &[PathBuf],
    config: &PublishConfig,
    store: &impl ContentStore,
) -> Result<ArtifactCatalog, PublishError> {
    let trees = resolve_source_trees(sources)?;

    let mut catalog = ArtifactCatalog::new();
    for tree in &trees {
        let location = publish_tree(tree, config, store)?;
        catalog
            .insert(tree.name.clone(), location)
            .map_err(|name| PublishError::DuplicateArtifactName {
                name,
                paths: vec![tree.path.clone()],
            })?;
    }

    tracing::info!(
        artifacts = catalog.len(),
        container = %config.container,
        "artifact_catalog_published"
    );
    Ok(catalog)
}

/// Publishes the source trees plus the seed workspace, which is reported
/// outside the catalog.
pub fn publish_artifacts(
    sources: &[PathBuf],
    workspace: &Path,
    config: &PublishConfig,
    store: &impl ContentStore,
) -> Result<PublishedArtifacts, PublishError> {
    let workspace_tree = SourceTree::from_path(workspace)?;
    let catalog = publish_catalog(sources, config, store)?;
    let workspace = publish_tree(&workspace_tree, config, store)?;

    Ok(PublishedArtifacts { catalog, workspace })
}

fn resolve_source_trees(sources: &[PathBuf]) -> Result<Vec<SourceTree>, PublishError> {
    let trees = sources
        .iter()
        .map(SourceTree::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_name: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for tree in &trees {
        by_name
            .entry(tree.name.as_str())
            .or_default()
            .push(tree.path.clone());
    }

    if let Some((name, paths)) = by_name.iter().find(|(_, paths)| paths.len() > 1) {
        let mut paths = paths.clone();
        paths.sort();
        return Err(PublishError::DuplicateArtifactName {
            name: (*name).to_string(),
            paths,
        });
    }

    let mut trees = trees;
    trees.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(trees)
}

fn publish_tree(
    tree: &SourceTree,
    config: &PublishConfig,
    store: &impl ContentStore,
) -> Result<ArtifactLocation, PublishError> {
    let archive = package_directory(&tree.path).map_err(|source| PublishError::Packaging {
        path: tree.path.clone(),
        source,
    })?;
    tracing::info!(
        artifact = %tree.name,
        entries = archive.entry_count,
        bytes = archive.bytes.len(),
        digest = %archive.digest,
        "artifact_packaged"
    );

    let key = artifact_object_key(&config.key_prefix, &tree.name, &archive.digest);
    let location = upload_with_retry(tree, &key, &archive.bytes, config, store)?;
    tracing::info!(
        artifact = %tree.name,
        key = %location.key,
        version = location.version.as_deref().unwrap_or("-"),
        "artifact_uploaded"
    );
    Ok(location)
}

fn upload_with_retry(
    tree: &SourceTree,
    key: &str,
    body: &[u8],
    config: &PublishConfig,
    store: &impl ContentStore,
) -> Result<ArtifactLocation, PublishError> {
    let max_attempts = config.retry.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match store.upload(&config.container, key, body) {
            Ok(location) => return Ok(location),
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let delay = config.retry.backoff_after(attempt);
                tracing::warn!(
                    artifact = %tree.name,
                    key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "artifact_upload_retry"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(error) => {
                return Err(PublishError::StorageUnavailable {
                    path: tree.path.clone(),
                    key: key.to_string(),
                    attempts: attempt,
                    source: error,
                });
            }
        }
    }
}
