//! Structural diff of JSON response bodies

use std::fmt::{self, Write as _};

use serde_json::Value;

use crate::config::DiffConfig;
use crate::{ApiDiffError, Result};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// One step of a location inside a JSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

/// What happened at a location
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaKind {
    /// Present on the target only
    Added(Value),
    /// Present on the source only
    Removed(Value),
    /// Present on both sides with different values
    Changed {
        /// Source value
        from: Value,
        /// Target value
        to: Value,
    },
}

/// A single structural difference
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// Location from the document root
    pub path: Vec<Segment>,
    /// Kind of change
    pub kind: DeltaKind,
}

/// Diff two response bodies
///
/// Two empty bodies are equal. Otherwise both must be JSON documents.
///
/// # Errors
///
/// Returns `Parse` naming the side whose body is not valid JSON
pub fn diff_bodies(source: &str, target: &str) -> Result<Vec<Delta>> {
    if source.trim().is_empty() && target.trim().is_empty() {
        return Ok(Vec::new());
    }

    let from = parse_body(source, "source")?;
    let to = parse_body(target, "target")?;

    let mut deltas = Vec::new();
    diff_values(&mut Vec::new(), &from, &to, &mut deltas);
    Ok(deltas)
}

fn parse_body(body: &str, side: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| ApiDiffError::Parse(format!("{side} body is not JSON: {e}")))
}

fn diff_values(path: &mut Vec<Segment>, from: &Value, to: &Value, out: &mut Vec<Delta>) {
    match (from, to) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, old) in left {
                path.push(Segment::Key(key.clone()));
                match right.get(key) {
                    Some(new) => diff_values(path, old, new, out),
                    None => out.push(Delta {
                        path: path.clone(),
                        kind: DeltaKind::Removed(old.clone()),
                    }),
                }
                path.pop();
            }
            for (key, new) in right {
                if !left.contains_key(key) {
                    path.push(Segment::Key(key.clone()));
                    out.push(Delta {
                        path: path.clone(),
                        kind: DeltaKind::Added(new.clone()),
                    });
                    path.pop();
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for index in 0..left.len().max(right.len()) {
                path.push(Segment::Index(index));
                match (left.get(index), right.get(index)) {
                    (Some(old), Some(new)) => diff_values(path, old, new, out),
                    (Some(old), None) => out.push(Delta {
                        path: path.clone(),
                        kind: DeltaKind::Removed(old.clone()),
                    }),
                    (None, Some(new)) => out.push(Delta {
                        path: path.clone(),
                        kind: DeltaKind::Added(new.clone()),
                    }),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        _ if from == to => {}
        _ => out.push(Delta {
            path: path.clone(),
            kind: DeltaKind::Changed {
                from: from.clone(),
                to: to.clone(),
            },
        }),
    }
}

/// Render deltas one per line: `~` changed, `+` added, `-` removed
#[must_use]
pub fn render(deltas: &[Delta], config: &DiffConfig) -> String {
    deltas
        .iter()
        .map(|delta| {
            let (color, line) = match &delta.kind {
                DeltaKind::Added(value) => (
                    GREEN,
                    format!("+ {}: {value}", Location(&delta.path, config)),
                ),
                DeltaKind::Removed(value) => (
                    RED,
                    format!("- {}: {value}", Location(&delta.path, config)),
                ),
                DeltaKind::Changed { from, to } => (
                    YELLOW,
                    format!("~ {}: {from} => {to}", Location(&delta.path, config)),
                ),
            };
            if config.coloring {
                format!("{color}{line}{RESET}")
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON-path style rendering of a delta location, e.g. `$.items[2].id`
struct Location<'a>(&'a [Segment], &'a DiffConfig);

impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('$')?;
        for segment in self.0 {
            match segment {
                Segment::Key(key) if is_identifier(key) => write!(f, ".{key}")?,
                Segment::Key(key) => write!(f, "[{}]", Value::String(key.clone()))?,
                Segment::Index(index) if self.1.show_array_index => write!(f, "[{index}]")?,
                Segment::Index(_) => f.write_str("[]")?,
            }
        }
        Ok(())
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
