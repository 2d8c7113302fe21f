//! Cassette storage: one YAML document per interaction plus a stats sidecar

mod format;
mod reader;
mod writer;

pub use format::{
    CapturedRequest, CapturedResponse, Cassette, Interaction, RequestStats, CASSETTE_VERSION,
    STATS_SUFFIX, TEMP_SUFFIX,
};
pub use reader::{interaction_files, read_cassette, read_stats, stats_path};
pub use writer::{persist_cassette, write_stats};
