//! Matching rules applied uniformly to every interaction of a manifest
//!
//! Rules are parsed into [`MatchingRule`] when the manifest is loaded. They
//! are consumed twice while recording: as the replay matcher predicate and
//! as the filter that runs before a cassette reaches disk.

use std::collections::BTreeSet;
use serde::Deserialize;
use thiserror::Error;

use crate::replay::{default_matcher, Filter, Matcher};
use crate::storage::{CapturedRequest, Interaction};

/// Rule name overriding replay matching with a fixed answer
pub const MATCH_URL: &str = "match_url";

/// Rule name listing headers excluded from storage and comparison
pub const IGNORE_HEADERS: &str = "ignore_headers";

/// One manifest-scoped matching rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawMatchingRule")]
pub enum MatchingRule {
    /// Replace the default matcher with one that always answers this value
    MatchUrl(bool),
    /// Header names (case-insensitive) never persisted nor compared
    IgnoreHeaders(BTreeSet<String>),
}

/// Rule as written in a manifest: a name and an untyped value
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchingRule {
    /// Rule name, e.g. `match_url`
    pub name: String,
    /// Untyped rule value
    pub value: serde_yaml::Value,
}

/// Reason a manifest rule was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid matching rule: {0}")]
pub struct InvalidRule(String);

impl TryFrom<RawMatchingRule> for MatchingRule {
    type Error = InvalidRule;

    fn try_from(raw: RawMatchingRule) -> std::result::Result<Self, Self::Error> {
        match raw.name.as_str() {
            MATCH_URL => raw.value.as_bool().map(Self::MatchUrl).ok_or_else(|| {
                InvalidRule(format!("`{MATCH_URL}` expects a boolean, got {:?}", raw.value))
            }),
            IGNORE_HEADERS => {
                let serde_yaml::Value::Sequence(items) = &raw.value else {
                    return Err(InvalidRule(format!(
                        "`{IGNORE_HEADERS}` expects a list of header names, got {:?}",
                        raw.value
                    )));
                };

                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_ascii_lowercase)
                            .ok_or_else(|| {
                                InvalidRule(format!(
                                    "`{IGNORE_HEADERS}` entries must be strings, got {item:?}"
                                ))
                            })
                    })
                    .collect::<std::result::Result<BTreeSet<_>, _>>()
                    .map(Self::IgnoreHeaders)
            }
            other => Err(InvalidRule(format!("unknown rule `{other}`"))),
        }
    }
}

impl MatchingRule {
    /// Build an `ignore_headers` rule, normalizing names to lowercase
    pub fn ignore_headers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::IgnoreHeaders(
            names
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
        )
    }
}

/// Ordered rule set of one manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<MatchingRule>,
}

impl RuleSet {
    /// Create a rule set
    #[must_use]
    pub fn new(rules: Vec<MatchingRule>) -> Self {
        Self { rules }
    }

    /// Rules in manifest order
    #[must_use]
    pub fn rules(&self) -> &[MatchingRule] {
        &self.rules
    }

    /// Fixed matcher answer, if a `match_url` rule is present (last one wins)
    #[must_use]
    pub fn match_url(&self) -> Option<bool> {
        self.rules.iter().rev().find_map(|rule| match rule {
            MatchingRule::MatchUrl(value) => Some(*value),
            MatchingRule::IgnoreHeaders(_) => None,
        })
    }

    /// Union of every `ignore_headers` rule, lowercase
    #[must_use]
    pub fn ignored_headers(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                MatchingRule::IgnoreHeaders(names) => Some(names.iter().cloned()),
                MatchingRule::MatchUrl(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Whether a header name is excluded by an `ignore_headers` rule
    #[must_use]
    pub fn is_ignored(&self, header: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            MatchingRule::IgnoreHeaders(names) => names.contains(&header.to_ascii_lowercase()),
            MatchingRule::MatchUrl(_) => false,
        })
    }

    /// Build the replay matcher
    ///
    /// A `match_url` rule ignores the stored request entirely and answers its
    /// own value; without one the default method + URL + body matcher applies.
    #[must_use]
    pub fn matcher(&self) -> Matcher {
        match self.match_url() {
            Some(answer) => Box::new(move |_: &CapturedRequest, _: &CapturedRequest| answer),
            None => Box::new(default_matcher),
        }
    }

    /// Build the pre-persistence filter stripping ignored request headers
    #[must_use]
    pub fn filter(&self) -> Filter {
        let ignored = self.ignored_headers();
        Box::new(move |interaction: &mut Interaction| {
            interaction
                .request
                .headers
                .retain(|name, _| !ignored.contains(&name.to_ascii_lowercase()));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CapturedResponse;

    fn parse(yaml: &str) -> std::result::Result<RuleSet, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    fn request(url: &str) -> CapturedRequest {
        CapturedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: crate::manifest::Headers::new(),
            body: String::new(),
        }
    }

    #[test]
    fn test_parse_rules() {
        let rules = parse(
            r"
            - name: match_url
              value: true
            - name: ignore_headers
              value: [Date, X-Request-Id]
            ",
        )
        .unwrap();

        assert_eq!(rules.rules().len(), 2);
        assert_eq!(rules.match_url(), Some(true));
        assert!(rules.is_ignored("date"));
        assert!(rules.is_ignored("X-REQUEST-ID"));
        assert!(!rules.is_ignored("etag"));
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        assert!(parse("- name: match_url\n  value: [a]\n").is_err());
        assert!(parse("- name: ignore_headers\n  value: true\n").is_err());
        assert!(parse("- name: ignore_headers\n  value: [1]\n").is_err());
        assert!(parse("- name: match_body\n  value: true\n").is_err());
    }

    #[test]
    fn test_invalid_rule_message() {
        let raw = RawMatchingRule {
            name: "match_body".to_string(),
            value: serde_yaml::Value::Bool(true),
        };
        let err = MatchingRule::try_from(raw).unwrap_err();
        let source: &dyn std::error::Error = &err;
        assert_eq!(
            source.to_string(),
            "invalid matching rule: unknown rule `match_body`"
        );
    }

    #[test]
    fn test_match_url_overrides_default_matcher() {
        let stored = request("http://a/x");
        let other = request("http://b/y");

        let always = RuleSet::new(vec![MatchingRule::MatchUrl(true)]).matcher();
        assert!(always(&other, &stored));

        let never = RuleSet::new(vec![MatchingRule::MatchUrl(false)]).matcher();
        assert!(!never(&stored, &stored));

        let default = RuleSet::default().matcher();
        assert!(default(&stored, &stored));
        assert!(!default(&other, &stored));
    }

    #[test]
    fn test_last_match_url_wins() {
        let rules = RuleSet::new(vec![
            MatchingRule::MatchUrl(true),
            MatchingRule::MatchUrl(false),
        ]);
        assert_eq!(rules.match_url(), Some(false));
    }

    #[test]
    fn test_filter_strips_ignored_request_headers() {
        let rules = RuleSet::new(vec![MatchingRule::ignore_headers(["Authorization"])]);
        let filter = rules.filter();

        let mut req = request("http://a/x");
        req.headers
            .insert("authorization".to_string(), vec!["Bearer t".to_string()]);
        req.headers
            .insert("Accept".to_string(), vec!["application/json".to_string()]);

        let mut interaction = Interaction {
            request: req,
            response: CapturedResponse::default(),
        };
        filter(&mut interaction);

        assert!(!interaction.request.headers.contains_key("authorization"));
        assert!(interaction.request.headers.contains_key("Accept"));
    }
}
