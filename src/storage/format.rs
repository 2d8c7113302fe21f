//! On-disk document structures
//!
//! A cassette holds the capture of one interaction definition. Its timing
//! measurements live next to it in a stats sidecar.

use serde::{Deserialize, Serialize};

use crate::manifest::Headers;

/// Current cassette document version
pub const CASSETTE_VERSION: u32 = 1;

/// Suffix appended to a cassette file name to form its stats sidecar
pub const STATS_SUFFIX: &str = "_stats";

/// Suffix of cassettes still being written
pub const TEMP_SUFFIX: &str = ".tmp";

/// Persisted capture of HTTP exchanges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cassette {
    /// Document version
    pub version: u32,
    /// Captured exchanges, in the order they happened
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl Default for Cassette {
    fn default() -> Self {
        Self {
            version: CASSETTE_VERSION,
            interactions: Vec::new(),
        }
    }
}

/// One captured request/response exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Request as sent
    pub request: CapturedRequest,
    /// Response as received
    pub response: CapturedResponse,
}

/// Captured request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    /// Absolute URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Request headers
    #[serde(default)]
    pub headers: Headers,
    /// Request body
    #[serde(default)]
    pub body: String,
}

/// Captured response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    /// Status line text, e.g. `200 OK`
    #[serde(default)]
    pub status: String,
    /// Status code
    pub code: u16,
    /// Response headers (lowercase names)
    #[serde(default)]
    pub headers: Headers,
    /// Response body
    #[serde(default)]
    pub body: String,
    /// Total exchange time in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
}

/// Timing breakdown of one exchange, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    /// DNS resolution
    pub dns_lookup: u64,
    /// TCP connect
    pub tcp_connection: u64,
    /// TLS handshake (zero for plain HTTP)
    #[serde(alias = "tls_andshake")]
    pub tls_handshake: u64,
    /// Request sent until response head received
    pub server_processing: u64,
    /// Response body transfer
    pub content_transfer: u64,
}

impl RequestStats {
    /// Total time spent on the exchange
    #[must_use]
    pub fn duration(&self) -> u64 {
        self.dns_lookup
            .saturating_add(self.tcp_connection)
            .saturating_add(self.tls_handshake)
            .saturating_add(self.server_processing)
            .saturating_add(self.content_transfer)
    }
}
