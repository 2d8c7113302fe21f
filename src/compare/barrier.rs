//! Bounded wait for files flushed in the background

use std::path::Path;

use tracing::debug;

use crate::config::PersistenceConfig;
use crate::{ApiDiffError, Result};

/// Poll until `path` exists
///
/// The path is checked up to `max_attempts` times, `poll_interval` apart.
///
/// # Errors
///
/// Returns `Timeout` once the attempts are exhausted, or an I/O error if the
/// existence check itself fails
pub async fn wait_for_path(path: &Path, config: &PersistenceConfig) -> Result<()> {
    for attempt in 1..=config.max_attempts {
        if tokio::fs::try_exists(path).await? {
            return Ok(());
        }
        debug!(
            "Waiting for {} (attempt {attempt}/{})",
            path.display(),
            config.max_attempts
        );
        tokio::time::sleep(config.poll_interval()).await;
    }

    Err(ApiDiffError::Timeout {
        path: path.to_path_buf(),
        waited: config.ceiling(),
    })
}
