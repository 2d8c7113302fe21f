//! Cassette and stats file reader

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::format::{Cassette, RequestStats, STATS_SUFFIX, TEMP_SUFFIX};
use crate::{ApiDiffError, Result};

/// Path of the stats sidecar belonging to a cassette
#[must_use]
pub fn stats_path(cassette_path: &Path) -> PathBuf {
    let mut name: OsString = cassette_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(STATS_SUFFIX);
    cassette_path.with_file_name(name)
}

/// Read a cassette document
///
/// # Errors
///
/// Returns `Io` if the file cannot be read and `Parse` if it is malformed
pub fn read_cassette(path: &Path) -> Result<Cassette> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| ApiDiffError::Parse(format!("cassette {}: {e}", path.display())))
}

/// Read the stats sidecar of a cassette
///
/// # Errors
///
/// Returns `Io` if the sidecar is missing and `Parse` if it is malformed
pub fn read_stats(cassette_path: &Path) -> Result<RequestStats> {
    let path = stats_path(cassette_path);
    let content = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| ApiDiffError::Parse(format!("stats {}: {e}", path.display())))
}

/// Cassette files of a session directory, in file name order
///
/// Stats sidecars, cassettes still being written and subdirectories are
/// left out.
///
/// # Errors
///
/// Returns error if the directory cannot be read
pub fn interaction_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(STATS_SUFFIX) || name.ends_with(TEMP_SUFFIX) {
            continue;
        }

        files.push(entry.path());
    }

    files.sort();
    Ok(files)
}
