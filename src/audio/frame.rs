//! Audio data types exchanged with the call transport.

use std::time::{Duration, Instant};

/// One inbound frame of raw PCM from the call transport.
///
/// The payload is copied out of the transport's buffer; nothing is shared
/// with the transport after construction.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw 16kHz, 16-bit, mono PCM bytes.
    pub data: Vec<u8>,
    /// When the frame reached the session.
    pub arrived_at: Instant,
    /// Speaker of an unmixed buffer, if the transport knows it.
    pub speaker: Option<SpeakerContext>,
}

impl AudioFrame {
    /// Copies `data` into a new frame stamped with the current time.
    pub fn new(data: &[u8], speaker: Option<SpeakerContext>) -> Self {
        Self {
            data: data.to_vec(),
            arrived_at: Instant::now(),
            speaker,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Identity of the participant an unmixed audio buffer belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerContext {
    pub id: String,
    pub display_name: String,
}

impl SpeakerContext {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// One fixed-duration buffer of synthesized audio bound for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMediaBuffer {
    /// Exactly one frame of 16kHz, 16-bit, mono PCM.
    pub data: Vec<u8>,
    /// Playback duration of `data`.
    pub duration: Duration,
    /// Presentation timestamp in 100ns ticks.
    pub timestamp: i64,
}

impl OutboundMediaBuffer {
    /// Timestamp of the buffer that would directly follow this one.
    pub fn end_tick(&self) -> i64 {
        self.timestamp + (self.duration.as_micros() as i64) * 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_copies_payload() {
        let mut source = vec![1u8, 2, 3, 4];
        let frame = AudioFrame::new(&source, None);
        source[0] = 9;

        assert_eq!(frame.data, vec![1, 2, 3, 4]);
        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
        assert!(frame.arrived_at <= Instant::now());
    }

    #[test]
    fn test_audio_frame_keeps_speaker() {
        let speaker = SpeakerContext::new("42", "Ada");
        let frame = AudioFrame::new(&[0, 0], Some(speaker.clone()));
        assert_eq!(frame.speaker, Some(speaker));
    }

    #[test]
    fn test_outbound_end_tick() {
        let buffer = OutboundMediaBuffer {
            data: vec![0; 640],
            duration: Duration::from_millis(20),
            timestamp: 1_000_000,
        };
        assert_eq!(buffer.end_tick(), 1_200_000);
    }
}
