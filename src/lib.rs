//! apidiff - API regression testing by recording and comparing HTTP sessions
//!
//! Interactions described in a manifest are recorded into named sessions on
//! disk. A later run of a manifest is compared against a recorded session,
//! reporting header and JSON body drift per interaction.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod compare;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod manifest;
pub mod network;
pub mod recording;
pub mod replay;
pub mod rules;
pub mod storage;

pub use error::{ApiDiffError, Result};
