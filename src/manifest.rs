//! Declarative manifest of interactions to record or compare

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::rules::RuleSet;
use crate::{ApiDiffError, Result};

/// Multi-valued header mapping, iterated in name order
pub type Headers = BTreeMap<String, Vec<String>>;

/// A manifest: shared request defaults, matching rules and interactions
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// Manifest format version
    #[serde(default)]
    pub version: u32,
    /// Rules applied to every interaction
    #[serde(default)]
    pub matching_rules: RuleSet,
    /// Defaults shared by all interactions
    #[serde(default)]
    pub request: RequestInfo,
    /// Interactions in execution order
    #[serde(default)]
    pub interactions: Vec<RequestInteraction>,
}

/// Request defaults shared across a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestInfo {
    /// Default payload
    #[serde(default, rename = "body")]
    pub payload: String,
    /// Default headers
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: Headers,
}

/// One interaction definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestInteraction {
    /// Absolute target URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Expected response status
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Per-interaction headers, overriding shared ones of the same name
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: Headers,
    /// Payload, overriding the shared one when non-empty
    #[serde(default, rename = "body")]
    pub payload: String,
}

impl RequestInteraction {
    /// Payload to send: this interaction's own, else the shared default
    #[must_use]
    pub fn effective_payload<'a>(&'a self, shared: &'a RequestInfo) -> &'a str {
        if self.payload.is_empty() {
            &shared.payload
        } else {
            &self.payload
        }
    }

    /// Headers to send: shared defaults overridden name-by-name
    /// (case-insensitively) by this interaction's headers
    #[must_use]
    pub fn effective_headers(&self, shared: &RequestInfo) -> Headers {
        let mut headers = shared.headers.clone();
        for (name, values) in &self.headers {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), values.clone());
        }
        headers
    }
}

impl Manifest {
    /// Parse a manifest from YAML text
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the document or one of its matching rules is malformed
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml)?;
        Ok(manifest)
    }

    /// Parse a manifest from a reader
    ///
    /// # Errors
    ///
    /// Returns error if reading fails or the document is malformed
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut yaml = String::new();
        reader.read_to_string(&mut yaml)?;
        Self::from_yaml_str(&yaml)
    }

    /// Load a manifest file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            ApiDiffError::NotFound(format!("manifest {}: {e}", path.display()))
        })?;
        Self::from_reader(file)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accept `Name: value` as well as `Name: [v1, v2]`
fn deserialize_headers<'de, D>(deserializer: D) -> std::result::Result<Headers, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, OneOrMany>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, values)| match values {
            OneOrMany::One(value) => (name, vec![value]),
            OneOrMany::Many(values) => (name, values),
        })
        .collect())
}
