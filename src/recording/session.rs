//! Directory-backed session store

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::manifest::{RequestInfo, RequestInteraction};
use crate::rules::RuleSet;
use crate::storage::{interaction_files, read_cassette, read_stats, Interaction, RequestStats};
use crate::{ApiDiffError, Result};

use super::engine::Recorder;
use super::MAX_SESSION_NAME_LEN;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A recorded session as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session name (its directory name)
    pub name: String,
    /// Session directory
    pub storage_path: PathBuf,
    /// Modification time of the session directory
    pub created_at: SystemTime,
    /// Loadable interactions, in file listing order
    pub interactions: Vec<RecordedInteraction>,
}

impl Session {
    /// Creation time as local `YYYY-MM-DD HH:MM:SS`
    #[must_use]
    pub fn created_display(&self) -> String {
        DateTime::<Local>::from(self.created_at)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }
}

/// Summary of one stored interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInteraction {
    /// Request URL
    pub url: String,
    /// Request method
    pub method: String,
    /// Observed response status
    pub status_code: u16,
    /// Timings from the stats sidecar
    pub stats: RequestStats,
}

impl RecordedInteraction {
    /// Load the summary of the cassette at `path` and its stats sidecar
    ///
    /// # Errors
    ///
    /// Returns error if either document is missing or malformed
    pub fn load(path: &Path) -> Result<Self> {
        let interaction = first_interaction(path)?;
        let stats = read_stats(path)?;

        Ok(Self {
            url: interaction.request.url,
            method: interaction.request.method,
            status_code: interaction.response.code,
            stats,
        })
    }
}

/// Session store rooted at one storage directory
pub struct SessionStore {
    root: PathBuf,
    recorder: Recorder,
}

impl SessionStore {
    /// Create a store over `root`
    #[must_use]
    pub fn new(root: PathBuf, recorder: Recorder) -> Self {
        Self { root, recorder }
    }

    /// Storage root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recorder used by [`SessionStore::record`]
    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// List every session, sorted by name
    ///
    /// Unreadable interactions are skipped, so a listing may be partial.
    /// A missing storage root holds no session.
    ///
    /// # Errors
    ///
    /// Returns error if the storage root exists but cannot be read
    pub fn list(&self) -> Result<Vec<Session>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry);
            }
        }
        dirs.sort_by_key(std::fs::DirEntry::file_name);

        let mut sessions = Vec::with_capacity(dirs.len());
        for entry in dirs {
            let name = entry.file_name().to_string_lossy().into_owned();
            match load_session(&name, &entry.path()) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping session '{name}': {e}"),
            }
        }

        debug!("Listed {} session(s) in {}", sessions.len(), self.root.display());
        Ok(sessions)
    }

    /// Load one session
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session directory has this name
    pub fn show(&self, name: &str) -> Result<Session> {
        let dir = self.session_dir(name)?;
        load_session(name, &dir)
    }

    /// Full capture and stats of the `index`-th (1-based) interaction
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown session, `IndexOutOfRange` for an
    /// index outside `1..=count`, and a read error if either document of the
    /// selected interaction is missing or malformed
    pub fn detail(&self, name: &str, index: usize) -> Result<(Interaction, RequestStats)> {
        let dir = self.session_dir(name)?;
        let files = interaction_files(&dir)?;

        let Some(path) = index.checked_sub(1).and_then(|i| files.get(i)) else {
            return Err(ApiDiffError::IndexOutOfRange {
                index,
                available: files.len(),
            });
        };

        let interaction = first_interaction(path)?;
        let stats = read_stats(path)?;
        Ok((interaction, stats))
    }

    /// Delete a session and everything recorded in it
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session does not exist
    pub fn delete(&self, name: &str) -> Result<()> {
        let dir = self.session_dir(name)?;
        std::fs::remove_dir_all(&dir)?;
        info!("Deleted session '{name}'");
        Ok(())
    }

    /// Record one interaction into session `name` under the storage root
    ///
    /// # Errors
    ///
    /// Returns the recorder's error
    pub async fn record(
        &self,
        name: &str,
        interaction: &RequestInteraction,
        shared: &RequestInfo,
        rules: &RuleSet,
    ) -> Result<PathBuf> {
        self.recorder
            .record(&self.root, name, interaction, shared, rules)
            .await
    }

    fn session_dir(&self, name: &str) -> Result<PathBuf> {
        validate_session_name(name)?;
        let dir = self.root.join(name);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ApiDiffError::NotFound(format!("session '{name}'")))
        }
    }
}

fn load_session(name: &str, dir: &Path) -> Result<Session> {
    let created_at = std::fs::metadata(dir)?.modified()?;

    let mut interactions = Vec::new();
    for path in interaction_files(dir)? {
        match RecordedInteraction::load(&path) {
            Ok(interaction) => interactions.push(interaction),
            Err(e) => warn!("Skipping interaction {}: {e}", path.display()),
        }
    }

    Ok(Session {
        name: name.to_string(),
        storage_path: dir.to_path_buf(),
        created_at,
        interactions,
    })
}

/// First interaction of the cassette at `path`
pub(crate) fn first_interaction(path: &Path) -> Result<Interaction> {
    read_cassette(path)?
        .interactions
        .into_iter()
        .next()
        .ok_or_else(|| ApiDiffError::Parse(format!("cassette {} is empty", path.display())))
}

/// Validate a session name before it is used as a directory name
///
/// # Errors
///
/// Returns `Validation` if the name is empty, too long, hidden, or could
/// escape the storage root
pub(crate) fn validate_session_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ApiDiffError::Validation(
            "Session name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_SESSION_NAME_LEN {
        return Err(ApiDiffError::Validation(format!(
            "Session name too long: {} > {MAX_SESSION_NAME_LEN}",
            name.len()
        )));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(ApiDiffError::Validation(
            "Session name cannot contain path separators".to_string(),
        ));
    }

    if name.starts_with('.') {
        return Err(ApiDiffError::Validation(
            "Session name cannot start with dot".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(ApiDiffError::Validation(
            "Session name cannot contain null bytes".to_string(),
        ));
    }

    if name.contains("..") {
        return Err(ApiDiffError::Validation(
            "Session name cannot contain '..'".to_string(),
        ));
    }

    Ok(())
}
