//! Per-call speech session.

mod listener;
#[allow(clippy::module_inception)]
mod session;
mod state;

pub use listener::{CollectingListener, SessionListener};
pub use session::{SessionBuilder, SpeechSession};
pub use state::{EndReason, SessionEnd, SpeechSessionState};
