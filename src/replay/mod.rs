//! Record-and-replay interception scope
//!
//! A scope is bound to one cassette path. When the cassette already exists
//! the scope replays it; otherwise it performs real exchanges and persists
//! them when stopped.

mod scope;

pub use scope::{Exchange, ReplayScope, ScopeMode};

use crate::storage::{CapturedRequest, Interaction};

/// Predicate deciding whether an observed request matches a stored one
pub type Matcher = Box<dyn Fn(&CapturedRequest, &CapturedRequest) -> bool + Send + Sync>;

/// Mutation applied to every captured interaction before it is persisted
pub type Filter = Box<dyn Fn(&mut Interaction) + Send + Sync>;

/// Default request equality: method, URL and body
#[must_use]
pub fn default_matcher(observed: &CapturedRequest, stored: &CapturedRequest) -> bool {
    observed.method.eq_ignore_ascii_case(&stored.method)
        && observed.url == stored.url
        && observed.body == stored.body
}
