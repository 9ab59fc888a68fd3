//! Push-style audio input stream feeding the recognizer.
//!
//! The call transport pushes PCM frames with [`AudioInputBuffer::write`]; the
//! recognizer pulls bytes through [`AudioInputReader`], which implements
//! [`std::io::Read`]. One producer, one consumer. Chunks travel over a
//! bounded crossbeam channel, so a stalled recognizer applies backpressure to
//! the writer instead of growing memory without limit.

use crate::error::{Result, SpeechError};
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard};

struct Shared {
    tx: Mutex<Option<Sender<Vec<u8>>>>,
    rx: Mutex<Option<Receiver<Vec<u8>>>>,
}

/// Writer side of the input stream. Cloning yields another handle to the
/// same stream, not a second producer slot.
#[derive(Clone)]
pub struct AudioInputBuffer {
    shared: Arc<Shared>,
}

impl AudioInputBuffer {
    /// Creates a stream that holds at most `capacity_frames` unread writes.
    pub fn new(capacity_frames: usize) -> Self {
        let (tx, rx) = bounded(capacity_frames.max(1));
        Self {
            shared: Arc::new(Shared {
                tx: Mutex::new(Some(tx)),
                rx: Mutex::new(Some(rx)),
            }),
        }
    }

    /// Takes the single reader. Returns `None` once the reader was taken.
    pub fn take_reader(&self) -> Option<AudioInputReader> {
        lock(&self.shared.rx).take().map(AudioInputReader::new)
    }

    /// Appends a frame to the stream.
    ///
    /// Blocks while the stream is full. Fails with
    /// [`SpeechError::StreamClosed`] after [`close`](Self::close) or once the
    /// reader is gone.
    pub fn write(&self, frame: &[u8]) -> Result<()> {
        let tx = lock(&self.shared.tx)
            .as_ref()
            .cloned()
            .ok_or(SpeechError::StreamClosed)?;
        if frame.is_empty() {
            return Ok(());
        }
        tx.send(frame.to_vec()).map_err(|_| SpeechError::StreamClosed)
    }

    /// Signals end-of-stream. The reader drains what was written, then sees EOF.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        lock(&self.shared.tx).take();
    }

    /// Returns true once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared.tx).is_none()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reader side of the input stream.
pub struct AudioInputReader {
    rx: Receiver<Vec<u8>>,
    interrupt: Option<Receiver<()>>,
    pending: Vec<u8>,
    position: usize,
}

impl AudioInputReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            interrupt: None,
            pending: Vec::new(),
            position: 0,
        }
    }

    /// Makes blocked reads return EOF once `interrupt` disconnects.
    ///
    /// The recognition engine passes its stop signal here so a backend parked
    /// on an idle stream wakes up when stop is requested.
    pub fn interrupt_on(mut self, interrupt: Receiver<()>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Blocks for the next non-empty chunk. `None` means end of stream.
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        loop {
            let received = match &self.interrupt {
                Some(interrupt) => select! {
                    recv(self.rx) -> chunk => chunk.ok(),
                    recv(interrupt) -> _ => None,
                },
                None => self.rx.recv().ok(),
            };
            match received {
                Some(chunk) if chunk.is_empty() => continue,
                other => return other,
            }
        }
    }

    /// Reads little-endian 16-bit samples into `samples`, filling it unless
    /// the stream ends first. Returns the number of samples read; 0 is EOF.
    pub fn read_samples(&mut self, samples: &mut [i16]) -> io::Result<usize> {
        let mut bytes = vec![0u8; samples.len() * 2];
        let filled = crate::audio::framer::read_full(self, &mut bytes)?;
        let count = filled / 2;
        for (sample, pair) in samples.iter_mut().zip(bytes[..count * 2].chunks_exact(2)) {
            *sample = i16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(count)
    }
}

impl Read for AudioInputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position >= self.pending.len() {
            match self.next_chunk() {
                Some(chunk) => {
                    self.pending = chunk;
                    self.position = 0;
                }
                None => return Ok(0),
            }
        }
        let available = &self.pending[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}
