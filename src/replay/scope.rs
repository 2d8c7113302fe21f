//! Cassette-bound interception scope

use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{default_matcher, Filter, Matcher};
use crate::network::TimedClient;
use crate::storage::{
    persist_cassette, read_cassette, CapturedRequest, CapturedResponse, Cassette, Interaction,
    RequestStats,
};
use crate::{ApiDiffError, Result};

/// Whether a scope talks to the network or serves a stored cassette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// No cassette existed: exchanges go over the wire and are captured
    Recording,
    /// A cassette existed: exchanges are served from it
    Replaying,
}

/// Outcome of one intercepted round trip
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Response as received or replayed
    pub response: CapturedResponse,
    /// Measured timings; all zero when replayed
    pub stats: RequestStats,
    /// Whether the response came from the cassette
    pub replayed: bool,
}

/// Interception scope bound to one cassette path
///
/// Opening the scope decides its mode once. Recorded interactions are kept
/// in memory and only reach disk through [`ReplayScope::stop`].
pub struct ReplayScope<'c> {
    path: PathBuf,
    mode: ScopeMode,
    client: &'c TimedClient,
    cassette: Cassette,
    used: Vec<bool>,
    matcher: Matcher,
    filters: Vec<Filter>,
    hits: usize,
    misses: usize,
}

impl<'c> ReplayScope<'c> {
    /// Open a scope on `path`
    ///
    /// # Errors
    ///
    /// Returns `Parse` if an existing cassette cannot be decoded
    pub fn open(path: impl Into<PathBuf>, client: &'c TimedClient) -> Result<Self> {
        let path = path.into();

        let (mode, cassette) = if path.is_file() {
            debug!("Replaying cassette {}", path.display());
            (ScopeMode::Replaying, read_cassette(&path)?)
        } else {
            debug!("Recording cassette {}", path.display());
            (ScopeMode::Recording, Cassette::default())
        };

        Ok(Self {
            used: vec![false; cassette.interactions.len()],
            path,
            mode,
            client,
            cassette,
            matcher: Box::new(default_matcher),
            filters: Vec::new(),
            hits: 0,
            misses: 0,
        })
    }

    /// Cassette path this scope is bound to
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode decided when the scope was opened
    #[must_use]
    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    /// Replace the replay matcher
    pub fn set_matcher(&mut self, matcher: Matcher) {
        self.matcher = matcher;
    }

    /// Register a filter run on every interaction before it is persisted
    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Stored or captured interaction at `index`
    #[must_use]
    pub fn interaction(&self, index: usize) -> Option<&Interaction> {
        self.cassette.interactions.get(index)
    }

    /// Number of interactions held by the scope
    #[must_use]
    pub fn len(&self) -> usize {
        self.cassette.interactions.len()
    }

    /// Whether the scope holds no interaction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cassette.interactions.is_empty()
    }

    /// Replay hits and misses so far
    #[must_use]
    pub fn hit_counts(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    /// Perform one intercepted exchange
    ///
    /// When replaying, the first stored interaction accepted by the matcher
    /// and not served yet answers the request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when replaying and no stored interaction matches,
    /// or the transport error when recording
    pub async fn round_trip(&mut self, request: CapturedRequest) -> Result<Exchange> {
        match self.mode {
            ScopeMode::Replaying => self.replay(&request),
            ScopeMode::Recording => {
                let timed = self.client.execute(&request).await?;
                self.cassette.interactions.push(Interaction {
                    request,
                    response: timed.response.clone(),
                });
                self.used.push(true);

                Ok(Exchange {
                    response: timed.response,
                    stats: timed.stats,
                    replayed: false,
                })
            }
        }
    }

    fn replay(&mut self, request: &CapturedRequest) -> Result<Exchange> {
        let matcher = &self.matcher;
        let found = self
            .cassette
            .interactions
            .iter()
            .zip(&self.used)
            .position(|(stored, used)| !used && matcher(request, &stored.request));

        let Some(index) = found else {
            self.misses += 1;
            warn!(
                "Replay miss: {} {} in {}",
                request.method,
                request.url,
                self.path.display()
            );
            return Err(ApiDiffError::NotFound(format!(
                "no recorded interaction matches {} {} in {}",
                request.method,
                request.url,
                self.path.display()
            )));
        };

        self.used[index] = true;
        self.hits += 1;
        let response = self.cassette.interactions[index].response.clone();
        debug!(
            "Replay hit: {} {} -> {}",
            request.method, request.url, response.code
        );

        Ok(Exchange {
            response,
            stats: RequestStats::default(),
            replayed: true,
        })
    }

    /// Close the scope
    ///
    /// In recording mode the filters run over every captured interaction and
    /// the cassette is flushed in the background; the returned handle
    /// resolves once it is on disk. Replaying scopes write nothing.
    pub fn stop(mut self) -> Option<JoinHandle<Result<()>>> {
        match self.mode {
            ScopeMode::Replaying => None,
            ScopeMode::Recording => {
                for interaction in &mut self.cassette.interactions {
                    for filter in &self.filters {
                        filter(interaction);
                    }
                }
                info!(
                    "Saving {} interaction(s) to {}",
                    self.cassette.interactions.len(),
                    self.path.display()
                );
                Some(persist_cassette(self.path, self.cassette))
            }
        }
    }
}
