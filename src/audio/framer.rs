//! Slices a synthesized audio stream into fixed-duration outbound buffers.

use crate::audio::frame::OutboundMediaBuffer;
use crate::defaults;
use crate::error::{Result, SpeechError};
use std::io::{self, Read};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in 100ns ticks, replaceable in tests.
pub trait MediaClock: Send + Sync {
    fn now_ticks(&self) -> i64;
}

/// Ticks since the Unix epoch from the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMediaClock;

impl MediaClock for SystemMediaClock {
    fn now_ticks(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_nanos() / 100) as i64)
            .unwrap_or(0)
    }
}

/// Reads until `buf` is full or the stream ends, retrying short and
/// interrupted reads. Returns the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Cuts PCM streams into frames of a fixed size and duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaBufferFramer {
    frame_bytes: usize,
    frame_duration: Duration,
    interval_ticks: i64,
}

impl MediaBufferFramer {
    /// Creates a framer for `frame_ms` milliseconds of 16kHz mono PCM.
    pub fn new(frame_ms: u32) -> Self {
        Self {
            frame_bytes: defaults::frame_bytes(frame_ms),
            frame_duration: Duration::from_millis(frame_ms as u64),
            interval_ticks: defaults::frame_ticks(frame_ms),
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Tick distance between consecutive frame timestamps.
    pub fn interval_ticks(&self) -> i64 {
        self.interval_ticks
    }

    /// Lazily frames `stream`, stamping frame `n` with
    /// `start_tick + n * interval_ticks`.
    ///
    /// A trailing partial frame is padded with silence to full size. A read
    /// error is yielded once and ends the sequence.
    pub fn frame<R: Read>(&self, stream: R, start_tick: i64) -> MediaFrames<R> {
        MediaFrames {
            stream,
            framer: *self,
            next_tick: start_tick,
            finished: false,
        }
    }
}

impl Default for MediaBufferFramer {
    fn default() -> Self {
        Self::new(defaults::FRAME_MS)
    }
}

/// Finite, non-restartable sequence of outbound buffers for one utterance.
pub struct MediaFrames<R> {
    stream: R,
    framer: MediaBufferFramer,
    next_tick: i64,
    finished: bool,
}

impl<R> MediaFrames<R> {
    /// Timestamp the next frame would carry. After the sequence ends this is
    /// the end of the last frame.
    pub fn next_tick(&self) -> i64 {
        self.next_tick
    }
}

impl<R: Read> Iterator for MediaFrames<R> {
    type Item = Result<OutboundMediaBuffer>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut data = vec![0u8; self.framer.frame_bytes];
        let filled = match read_full(&mut self.stream, &mut data) {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Some(Err(SpeechError::Io(e)));
            }
        };

        if filled == 0 {
            self.finished = true;
            return None;
        }
        if filled < data.len() {
            // Short tail: the zero-initialised remainder is the silence padding
            self.finished = true;
        }

        let buffer = OutboundMediaBuffer {
            data,
            duration: self.framer.frame_duration,
            timestamp: self.next_tick,
        };
        self.next_tick += self.framer.interval_ticks;
        Some(Ok(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call and sometimes
    /// reports `Interrupted`.
    struct TrickleReader {
        data: Vec<u8>,
        position: usize,
        step: usize,
        calls: usize,
    }

    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 3 == 0 {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            let n = self.step.min(buf.len()).min(self.data.len() - self.position);
            buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
            self.position += n;
            Ok(n)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "synthesizer gone"))
        }
    }

    fn collect(framer: &MediaBufferFramer, bytes: Vec<u8>, start: i64) -> Vec<OutboundMediaBuffer> {
        framer
            .frame(Cursor::new(bytes), start)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemMediaClock;
        let first = clock.now_ticks();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now_ticks() > first);
        assert!(first > 0);
    }

    #[test]
    fn test_default_framer_is_20ms() {
        let framer = MediaBufferFramer::default();
        assert_eq!(framer.frame_bytes(), 640);
        assert_eq!(framer.frame_duration(), Duration::from_millis(20));
        assert_eq!(framer.interval_ticks(), 200_000);
    }

    #[test]
    fn test_timestamps_contiguous_for_any_length() {
        let framer = MediaBufferFramer::default();
        for len in [1usize, 639, 640, 641, 1280, 1999, 6400, 10_001] {
            let frames = collect(&framer, vec![1u8; len], 5_000);
            assert_eq!(frames.len(), len.div_ceil(640), "length {len}");
            for (n, frame) in frames.iter().enumerate() {
                assert_eq!(frame.timestamp, 5_000 + n as i64 * 200_000);
                assert_eq!(frame.data.len(), 640);
                assert_eq!(frame.duration, Duration::from_millis(20));
            }
        }
    }

    #[test]
    fn test_trailing_partial_frame_is_padded() {
        let framer = MediaBufferFramer::default();
        let frames = collect(&framer, vec![7u8; 700], 0);

        assert_eq!(frames.len(), 2);
        let tail = &frames[1].data;
        assert!(tail[..60].iter().all(|&b| b == 7));
        assert!(tail[60..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let framer = MediaBufferFramer::default();
        let mut frames = framer.frame(Cursor::new(Vec::new()), 0);
        assert!(frames.next().is_none());
        assert_eq!(frames.next_tick(), 0);
    }

    #[test]
    fn test_short_reads_are_retried() {
        let framer = MediaBufferFramer::default();
        let data: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let reader = TrickleReader {
            data: data.clone(),
            position: 0,
            step: 33,
            calls: 0,
        };

        let frames: Vec<_> = framer
            .frame(reader, 0)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let joined: Vec<u8> = frames.iter().flat_map(|f| f.data.clone()).collect();

        assert_eq!(frames.len(), 4);
        assert_eq!(&joined[..2000], data.as_slice());
    }

    #[test]
    fn test_read_error_is_yielded_once() {
        let framer = MediaBufferFramer::default();
        let mut frames = framer.frame(FailingReader, 0);
        assert!(matches!(frames.next(), Some(Err(SpeechError::Io(_)))));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_next_tick_after_exhaustion() {
        let framer = MediaBufferFramer::new(10);
        let mut frames = framer.frame(Cursor::new(vec![0u8; 960]), 100);
        let count = frames.by_ref().count();
        assert_eq!(count, 3);
        assert_eq!(frames.next_tick(), 100 + 3 * 100_000);
    }
}
