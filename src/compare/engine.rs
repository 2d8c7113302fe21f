//! Comparator re-recording a manifest and diffing it against a session

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::barrier::wait_for_path;
use super::jsondiff::{diff_bodies, render};
use crate::config::{DiffConfig, PersistenceConfig};
use crate::fingerprint::fingerprint;
use crate::manifest::Manifest;
use crate::recording::{first_interaction, Recorder, Session};
use crate::rules::RuleSet;
use crate::storage::{interaction_files, Interaction};
use crate::Result;

/// Body difference category holding the rendered JSON delta
pub const PAYLOAD_KEY: &str = "payload";

/// Differences found for one compared interaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Differences {
    /// Position of the interaction in the target manifest
    pub interaction_index: usize,
    /// URL of the target interaction
    pub url: String,
    /// Header name to mismatch description
    pub headers: BTreeMap<String, String>,
    /// Body category to rendered delta
    pub body: BTreeMap<String, String>,
    /// Whether any header or body difference was found
    pub changed: bool,
}

/// Progress of one interaction through a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareStage {
    /// Target exchange being performed
    Recording,
    /// Waiting for the target cassette to be flushed
    WaitingForPersistence,
    /// Source and target captures loaded
    Loaded,
    /// Differences computed
    Diffed,
}

impl fmt::Display for CompareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recording => "recording",
            Self::WaitingForPersistence => "waiting for persistence",
            Self::Loaded => "loaded",
            Self::Diffed => "diffed",
        };
        f.write_str(name)
    }
}

/// Compares recorded sessions against fresh runs of a manifest
pub struct Comparator<'r> {
    recorder: &'r Recorder,
    persistence: PersistenceConfig,
    diff: DiffConfig,
    scratch_root: Option<PathBuf>,
}

impl<'r> Comparator<'r> {
    /// Create a comparator
    #[must_use]
    pub fn new(recorder: &'r Recorder, persistence: PersistenceConfig, diff: DiffConfig) -> Self {
        Self {
            recorder,
            persistence,
            diff,
            scratch_root: None,
        }
    }

    /// Create temporary target stores under `root` instead of the system
    /// temporary directory
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Re-record every interaction of `target` and diff it against `source`
    ///
    /// Target captures go to a private temporary directory that is removed
    /// before returning, whatever the outcome. Interactions run strictly in
    /// manifest order and the first failure aborts the comparison. A
    /// manifest index with no source counterpart is skipped.
    ///
    /// # Errors
    ///
    /// Returns the first recording, persistence-wait, load or diff error
    pub async fn compare(
        &self,
        source: &Session,
        target: &Manifest,
    ) -> Result<BTreeMap<usize, Differences>> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("apidiff-compare-");
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let outcome = self.compare_into(scratch.path(), source, target).await;
        let closed = scratch.close();

        let results = outcome?;
        closed?;
        Ok(results)
    }

    async fn compare_into(
        &self,
        scratch: &Path,
        source: &Session,
        target: &Manifest,
    ) -> Result<BTreeMap<usize, Differences>> {
        let source_files = interaction_files(&source.storage_path)?;
        let claimed = claimed_fingerprints(&source_files, target);

        info!(
            "Comparing session '{}' against {} interaction(s)",
            source.name,
            target.interactions.len()
        );

        let mut results = BTreeMap::new();
        for (index, interaction) in target.interactions.iter().enumerate() {
            stage(index, CompareStage::Recording);
            let target_path = self
                .recorder
                .record(
                    scratch,
                    &source.name,
                    interaction,
                    &target.request,
                    &target.matching_rules,
                )
                .await?;

            stage(index, CompareStage::WaitingForPersistence);
            wait_for_path(&target_path, &self.persistence).await?;

            let Some(source_path) = pick_source(&source_files, &claimed, &target_path, index)
            else {
                debug!(
                    "Interaction {index}: session '{}' has no counterpart, skipping",
                    source.name
                );
                continue;
            };

            let expected = first_interaction(source_path)?;
            let observed = first_interaction(&target_path)?;
            stage(index, CompareStage::Loaded);

            let mut differences =
                diff_interactions(&expected, &observed, &target.matching_rules, &self.diff)?;
            differences.interaction_index = index;
            differences.url.clone_from(&interaction.url);
            stage(index, CompareStage::Diffed);

            results.insert(index, differences);
        }

        let changed = results.values().filter(|d| d.changed).count();
        info!(
            "Compared {} interaction(s), {changed} changed",
            results.len()
        );
        Ok(results)
    }
}

fn stage(index: usize, stage: CompareStage) {
    debug!("Interaction {index}: {stage}");
}

/// Source cassette names matching the fingerprint of some target interaction
fn claimed_fingerprints(source_files: &[PathBuf], target: &Manifest) -> BTreeSet<OsString> {
    let fingerprints: BTreeSet<OsString> = target
        .interactions
        .iter()
        .map(|interaction| OsString::from(fingerprint(interaction)))
        .collect();

    source_files
        .iter()
        .filter_map(|path| path.file_name())
        .filter(|name| fingerprints.contains(*name))
        .map(OsString::from)
        .collect()
}

/// Source cassette with the same fingerprint, else the `index`-th one
///
/// The positional fallback never returns a cassette that another target
/// interaction joins by fingerprint.
fn pick_source<'a>(
    source_files: &'a [PathBuf],
    claimed: &BTreeSet<OsString>,
    target_path: &Path,
    index: usize,
) -> Option<&'a PathBuf> {
    let fingerprint = target_path.file_name();
    source_files
        .iter()
        .find(|path| path.file_name() == fingerprint)
        .or_else(|| {
            source_files
                .get(index)
                .filter(|path| path.file_name().map_or(true, |name| !claimed.contains(name)))
        })
}

/// Diff the responses of two captures
///
/// Headers are matched by case-insensitive name; headers ignored by `rules`
/// or present only on the target are not reported.
///
/// # Errors
///
/// Returns `Parse` if a non-empty body is not JSON
pub(crate) fn diff_interactions(
    expected: &Interaction,
    observed: &Interaction,
    rules: &RuleSet,
    config: &DiffConfig,
) -> Result<Differences> {
    let mut differences = Differences::default();

    for (name, values) in &expected.response.headers {
        if rules.is_ignored(name) {
            continue;
        }

        let found = observed
            .response
            .headers
            .iter()
            .find(|(other, _)| other.eq_ignore_ascii_case(name));

        match found {
            None => {
                differences
                    .headers
                    .insert(name.clone(), "header is missing".to_string());
            }
            Some((_, actual)) if actual != values => {
                differences.headers.insert(
                    name.clone(),
                    format!(
                        "expected {:?}, got {:?}",
                        values.join(", "),
                        actual.join(", ")
                    ),
                );
            }
            Some(_) => {}
        }
    }

    let deltas = diff_bodies(&expected.response.body, &observed.response.body)?;
    if !deltas.is_empty() {
        differences
            .body
            .insert(PAYLOAD_KEY.to_string(), render(&deltas, config));
    }

    differences.changed = !differences.headers.is_empty() || !differences.body.is_empty();
    Ok(differences)
}
