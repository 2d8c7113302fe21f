//! Cassette and stats file writer

use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::format::{Cassette, RequestStats, TEMP_SUFFIX};
use super::reader::stats_path;
use crate::{ApiDiffError, Result};

/// Persist a cassette on the blocking pool
///
/// The document is written next to its destination and renamed into place,
/// so a reader polling for `path` never observes a partial cassette. The
/// returned handle may be awaited or dropped; failures are logged either way.
pub fn persist_cassette(path: PathBuf, cassette: Cassette) -> JoinHandle<Result<()>> {
    tokio::task::spawn_blocking(move || {
        let result = write_cassette(&path, &cassette);
        match &result {
            Ok(()) => debug!("Persisted cassette {}", path.display()),
            Err(e) => warn!("Failed to persist cassette {}: {e}", path.display()),
        }
        result
    })
}

fn write_cassette(path: &Path, cassette: &Cassette) -> Result<()> {
    let yaml = serde_yaml::to_string(cassette)
        .map_err(|e| ApiDiffError::Parse(format!("Failed to encode cassette: {e}")))?;

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(TEMP_SUFFIX);
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, yaml)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Write the stats sidecar of a cassette
///
/// # Errors
///
/// Returns error if the sidecar cannot be encoded or written
pub async fn write_stats(cassette_path: &Path, stats: &RequestStats) -> Result<()> {
    let yaml = serde_yaml::to_string(stats)
        .map_err(|e| ApiDiffError::Parse(format!("Failed to encode stats: {e}")))?;
    tokio::fs::write(stats_path(cassette_path), yaml).await?;
    Ok(())
}
