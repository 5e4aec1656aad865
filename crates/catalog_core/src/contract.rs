use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::naming::logical_artifact_name;

/// A local directory that is packaged into one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub name: String,
    pub path: PathBuf,
}

impl SourceTree {
    /// Resolves `path` to an absolute directory and derives its logical name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let requested = path.as_ref();
        let absolute =
            std::fs::canonicalize(requested).map_err(|error| PublishError::InvalidSource {
                path: requested.to_path_buf(),
                reason: error.to_string(),
            })?;

        if !absolute.is_dir() {
            return Err(PublishError::InvalidSource {
                path: requested.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let basename = absolute
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PublishError::InvalidSource {
                path: requested.to_path_buf(),
                reason: "directory name is not valid UTF-8".to_string(),
            })?;

        let name =
            logical_artifact_name(basename).map_err(|name| PublishError::InvalidArtifactName {
                path: requested.to_path_buf(),
                name,
            })?;

        Ok(Self {
            name,
            path: absolute,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub container: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ArtifactLocation {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.container, self.key)
    }

    pub fn version_identifier(&self) -> String {
        match &self.version {
            Some(version) => format!("{}/{}@{version}", self.container, self.key),
            None => format!("{}/{}", self.container, self.key),
        }
    }
}

/// Logical artifact name to uploaded location, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactCatalog {
    entries: BTreeMap<String, ArtifactLocation>,
}

impl ArtifactCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry; an existing name is returned as the error and the
    /// catalog is left unchanged.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        location: ArtifactLocation,
    ) -> Result<(), String> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(name);
        }
        self.entries.insert(name, location);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactLocation> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArtifactLocation)> {
        self.entries
            .iter()
            .map(|(name, location)| (name.as_str(), location))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version_identifiers(&self) -> Vec<String> {
        self.entries
            .values()
            .map(ArtifactLocation::version_identifier)
            .collect()
    }
}

/// Result of a publish run: the catalog plus the separately reported seed
/// workspace payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifacts {
    pub catalog: ArtifactCatalog,
    pub workspace: ArtifactLocation,
}
