use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::PackagingError;

const FILE_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;
const DIRECTORY_MODE: u32 = 0o755;

/// A zip archive of one source tree together with its content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub bytes: Vec<u8>,
    pub digest: String,
    pub entry_count: usize,
}

/// Packages the contents of `root` into a zip archive.
///
/// Entries are written in path order with a fixed timestamp and normalized
/// permissions, so packaging an unchanged tree always yields the same bytes.
/// Symbolic links are skipped.
pub fn package_directory(root: &Path) -> Result<PackagedArchive, PackagingError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entry_count = 0usize;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "skipping symlink while packaging");
            continue;
        }

        let name = archive_entry_name(root, entry.path())?;
        if file_type.is_dir() {
            zip.add_directory(name, entry_options(DIRECTORY_MODE))?;
        } else {
            let body = fs::read(entry.path()).map_err(|source| PackagingError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
            let mode = file_mode(entry.path())?;
            zip.start_file(name, entry_options(mode))?;
            zip.write_all(&body).map_err(|source| PackagingError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
        }
        entry_count += 1;
    }

    let bytes = zip.finish()?.into_inner();
    let digest = content_digest(&bytes);
    Ok(PackagedArchive {
        bytes,
        digest,
        entry_count,
    })
}

pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn entry_options(mode: u32) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(mode)
}

fn archive_entry_name(root: &Path, path: &Path) -> Result<String, PackagingError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PackagingError::NonUtf8Path(path.to_path_buf()))?;

    let mut segments = Vec::new();
    for component in relative.components() {
        let segment = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| PackagingError::NonUtf8Path(path.to_path_buf()))?;
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32, PackagingError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|source| PackagingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.permissions().mode() & 0o111 != 0 {
        Ok(EXECUTABLE_MODE)
    } else {
        Ok(FILE_MODE)
    }
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<u32, PackagingError> {
    Ok(FILE_MODE)
}
