//! Comparison of a recorded session against a fresh run of a manifest

mod barrier;
mod engine;
mod jsondiff;

pub use barrier::wait_for_path;
pub use engine::{Comparator, CompareStage, Differences, PAYLOAD_KEY};
pub use jsondiff::{diff_bodies, render, Delta, DeltaKind, Segment};
