pub const ARCHIVE_EXTENSION: &str = "zip";

/// Content-addressed object key for a packaged artifact.
///
/// Identical content maps to the same key, so re-publishing an unchanged tree
/// overwrites an object with identical bytes.
pub fn artifact_object_key(base_prefix: &str, artifact_name: &str, digest: &str) -> String {
    let trimmed = base_prefix.trim_matches('/');
    if trimmed.is_empty() {
        format!("{artifact_name}/{digest}.{ARCHIVE_EXTENSION}")
    } else {
        format!("{trimmed}/{artifact_name}/{digest}.{ARCHIVE_EXTENSION}")
    }
}
