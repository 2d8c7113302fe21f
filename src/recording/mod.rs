//! Recording of manifest interactions into named sessions

mod engine;
mod session;

pub use engine::Recorder;
pub use session::{RecordedInteraction, Session, SessionStore};

pub(crate) use session::first_interaction;

/// Maximum length of a session name, in bytes
pub const MAX_SESSION_NAME_LEN: usize = 255;
