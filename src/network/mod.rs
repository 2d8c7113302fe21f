//! Network layer for apidiff
//!
//! Executes one HTTP/1.1 exchange per connection and measures each phase.

mod client;
mod tls;

pub use client::{Scheme, Target, TimedClient, TimedResponse};
