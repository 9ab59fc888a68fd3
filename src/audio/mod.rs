//! Audio types and streams shared by the recognizer and the synthesizer.

pub mod frame;
pub mod framer;
pub mod input_buffer;
pub mod vad;
pub mod wav;

pub use frame::{AudioFrame, OutboundMediaBuffer, SpeakerContext};
pub use framer::{MediaBufferFramer, MediaClock, MediaFrames, SystemMediaClock};
pub use input_buffer::{AudioInputBuffer, AudioInputReader};
