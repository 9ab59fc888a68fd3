//! Continuous speech recognition: event model, backend seam, engine and the
//! bundled recognizers.

pub mod backend;
pub mod continuous;
pub mod engine;
pub mod events;
pub mod scripted;

pub use backend::{EventPublisher, RecognitionBackend};
pub use continuous::{ContinuousRecognizer, ContinuousSettings};
pub use engine::{EventStream, RecognitionEngine};
pub use events::{
    CancellationErrorCode, CancellationReason, RecognitionEvent, RecognitionResult, ResultReason,
};
pub use scripted::{ScriptStep, ScriptedRecognizer};
