use std::path::{Path, PathBuf};

/// Classification used by callers to decide whether an upload may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailureKind {
    /// Timeouts, dispatch failures, throttling and server-side errors.
    Transient,
    /// Authorization and validation failures. Never retried.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UploadError {
    pub kind: UploadFailureKind,
    pub message: String,
}

impl UploadError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: UploadFailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: UploadFailureKind::Rejected,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == UploadFailureKind::Transient
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("i/o error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path '{}' is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Failures of a publish run. Every variant names the offending source.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid source '{}': {reason}", .path.display())]
    InvalidSource { path: PathBuf, reason: String },

    #[error("invalid artifact name '{name}' derived from '{}'", .path.display())]
    InvalidArtifactName { path: PathBuf, name: String },

    #[error("duplicate artifact name '{name}' derived from {}", display_paths(.paths))]
    DuplicateArtifactName { name: String, paths: Vec<PathBuf> },

    #[error(
        "storage unavailable for '{}' (key {key}) after {attempts} attempt(s): {source}",
        .path.display()
    )]
    StorageUnavailable {
        path: PathBuf,
        key: String,
        attempts: u32,
        #[source]
        source: UploadError,
    },

    #[error("failed to package '{}': {source}", .path.display())]
    Packaging {
        path: PathBuf,
        #[source]
        source: PackagingError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unresolved placeholder '{placeholder}'")]
    UnresolvedPlaceholder { placeholder: String },

    #[error("invalid base template: {0}")]
    InvalidBaseShape(String),

    #[error("i/o error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize rendered template: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("rendered template at '{}' failed verification: {reason}", .path.display())]
    Verification { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("missing required property '{0}'")]
    MissingRequiredProperty(String),

    #[error("malformed identifier '{value}': {reason}")]
    MalformedIdentifier { value: String, reason: String },

    #[error("malformed lifecycle event: {0}")]
    MalformedEvent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("lifecycle event carries no callback endpoint")]
    MissingEndpoint,

    #[error("timeout budget exhausted before the response could be delivered")]
    BudgetExhausted,

    #[error("callback endpoint rejected the response with status {status}")]
    Rejected { status: u16 },

    #[error("callback transport failed: {0}")]
    Transport(String),

    #[error("failed to serialize callback body: {0}")]
    Serialization(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| format!("'{}'", Path::display(path)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_error_names_every_colliding_path() {
        let error = PublishError::DuplicateArtifactName {
            name: "ModelBuild".to_string(),
            paths: vec![
                PathBuf::from("repos/model-build"),
                PathBuf::from("repos/model_build"),
            ],
        };

        assert_eq!(
            error.to_string(),
            "duplicate artifact name 'ModelBuild' derived from 'repos/model-build', 'repos/model_build'"
        );
    }

    #[test]
    fn only_transient_upload_errors_are_retryable() {
        assert!(UploadError::transient("timeout").is_retryable());
        assert!(!UploadError::rejected("AccessDenied").is_retryable());
    }
}
