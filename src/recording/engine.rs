//! Recorder executing one manifest interaction under interception

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::fingerprint::fingerprint;
use crate::manifest::{RequestInfo, RequestInteraction};
use crate::network::TimedClient;
use crate::replay::{ReplayScope, ScopeMode};
use crate::rules::RuleSet;
use crate::storage::{stats_path, write_stats, CapturedRequest};
use crate::Result;

use super::session::validate_session_name;

/// Permissions of created session directories: owner-writable, world-readable
#[cfg(unix)]
const SESSION_DIR_MODE: u32 = 0o755;

/// Records interactions into a session directory tree
pub struct Recorder {
    client: TimedClient,
}

impl Recorder {
    /// Create a recorder with its own timed transport
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot be built
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: TimedClient::new(config)?,
        })
    }

    /// Path of the cassette holding `interaction` within `session_name`
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the session name is unsafe as a directory name
    pub fn cassette_path(
        base_dir: &Path,
        session_name: &str,
        interaction: &RequestInteraction,
    ) -> Result<PathBuf> {
        validate_session_name(session_name)?;
        Ok(base_dir.join(session_name).join(fingerprint(interaction)))
    }

    /// Record one interaction and return the path of its cassette
    ///
    /// If the cassette already exists the exchange is replayed from it
    /// instead of going over the wire. The cassette is flushed in the
    /// background, so it may appear on disk shortly after this returns; the
    /// stats sidecar is written before returning.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed request or session name, `NotFound`
    /// on a replay miss, and `Network` if the exchange fails. Nothing is
    /// retried.
    pub async fn record(
        &self,
        base_dir: &Path,
        session_name: &str,
        interaction: &RequestInteraction,
        shared: &RequestInfo,
        rules: &RuleSet,
    ) -> Result<PathBuf> {
        let path = Self::cassette_path(base_dir, session_name, interaction)?;

        let request = CapturedRequest {
            url: interaction.url.clone(),
            method: interaction.method.to_ascii_uppercase(),
            headers: interaction.effective_headers(shared),
            body: interaction.effective_payload(shared).to_string(),
        };
        TimedClient::validate(&request)?;

        if let Some(dir) = path.parent() {
            create_session_dir(dir).await?;
        }

        let mut scope = ReplayScope::open(&path, &self.client)?;
        scope.set_matcher(rules.matcher());
        scope.add_filter(rules.filter());

        let exchange = scope.round_trip(request).await?;

        if let Some(expected) = interaction.status_code {
            if expected != exchange.response.code {
                warn!(
                    "{} {} answered {} (expected {expected})",
                    interaction.method, interaction.url, exchange.response.code
                );
            }
        }

        let mode = scope.mode();
        // Flush continues in the background once the handle is dropped
        drop(scope.stop());

        let stats_file = stats_path(&path);
        if mode == ScopeMode::Recording || !stats_file.exists() {
            write_stats(&path, &exchange.stats).await?;
        } else {
            debug!("Keeping existing stats {}", stats_file.display());
        }

        info!(
            "Recorded {} {} -> {} in {} ms ({})",
            interaction.method.to_ascii_uppercase(),
            interaction.url,
            exchange.response.code,
            exchange.stats.duration(),
            path.display()
        );

        Ok(path)
    }
}

async fn create_session_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(SESSION_DIR_MODE);
    builder.create(dir).await?;
    Ok(())
}
