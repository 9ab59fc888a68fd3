//! WAV file I/O for replaying recorded calls through a session.
//!
//! Input of any sample rate and channel count is converted to the call
//! format (16kHz, 16-bit, mono). Output is always written in that format.

use crate::audio::frame::OutboundMediaBuffer;
use crate::defaults::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use crate::error::{Result, SpeechError};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

fn wav_error(context: &str, e: hound::Error) -> SpeechError {
    SpeechError::Wav {
        message: format!("{context}: {e}"),
    }
}

/// Reads WAV data and returns call-format samples.
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<i16>> {
    let mut wav_reader =
        hound::WavReader::new(reader).map_err(|e| wav_error("Failed to parse WAV data", e))?;

    let spec = wav_reader.spec();
    let raw: Vec<i16> = wav_reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| wav_error("Failed to read WAV samples", e))?;

    let mono = downmix(&raw, spec.channels);
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Reads a WAV file into little-endian call-format PCM bytes.
pub fn read_pcm_file(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let samples = read_samples(std::io::BufReader::new(file))?;
    Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
}

/// Averages interleaved channels into one.
fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            match samples.get(source_idx + 1) {
                Some(&next) => {
                    let left = samples[source_idx] as f64;
                    (left + (next as f64 - left) * fraction) as i16
                }
                None => samples[source_idx],
            }
        })
        .collect()
}

/// Writes outbound media buffers to a WAV file in call format.
pub struct MediaWavWriter {
    writer: hound::WavWriter<BufWriter<File>>,
    frames: usize,
}

impl MediaWavWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| wav_error("Failed to create WAV file", e))?;
        Ok(Self { writer, frames: 0 })
    }

    /// Appends the PCM payload of `buffer`.
    pub fn write(&mut self, buffer: &OutboundMediaBuffer) -> Result<()> {
        for pair in buffer.data.chunks_exact(2) {
            self.writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| wav_error("Failed to write sample", e))?;
        }
        self.frames += 1;
        Ok(())
    }

    /// Number of buffers written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn finalize(self) -> Result<()> {
        self.writer
            .finalize()
            .map_err(|e| wav_error("Failed to finalize WAV file", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_call_format_passes_through() {
        let input = vec![100i16, -200, 300, 400, 500];
        let samples = read_samples(Cursor::new(make_wav_data(16000, 1, &input))).unwrap();
        assert_eq!(samples, input);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let stereo = vec![100i16, 200, 300, 400, -500, -600];
        let samples = read_samples(Cursor::new(make_wav_data(16000, 2, &stereo))).unwrap();
        assert_eq!(samples, vec![150i16, 350, -550]);
    }

    #[test]
    fn test_48khz_is_resampled() {
        let input = vec![1000i16; 48000];
        let samples = read_samples(Cursor::new(make_wav_data(48000, 1, &input))).unwrap();
        assert!((15900..=16100).contains(&samples.len()));
        assert!(samples.iter().all(|&s| (900..=1100).contains(&s)));
    }

    #[test]
    fn test_resample_identity_and_empty() {
        assert_eq!(resample(&[1, 2, 3], 16000, 16000), vec![1, 2, 3]);
        assert!(resample(&[], 8000, 16000).is_empty());
    }

    #[test]
    fn test_upsample_interpolates() {
        let out = resample(&[0, 1000], 8000, 16000);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 500);
        assert_eq!(out[2], 1000);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = read_samples(Cursor::new(b"definitely not a wav file".to_vec()));
        assert!(matches!(result, Err(SpeechError::Wav { .. })));
    }

    #[test]
    fn test_writer_round_trips_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut writer = MediaWavWriter::create(&path).unwrap();
        let data: Vec<u8> = [7i16, -7].iter().flat_map(|s| s.to_le_bytes()).collect();
        for n in 0..3 {
            writer
                .write(&OutboundMediaBuffer {
                    data: data.clone(),
                    duration: Duration::from_millis(20),
                    timestamp: n * 200_000,
                })
                .unwrap();
        }
        assert_eq!(writer.frames(), 3);
        writer.finalize().unwrap();

        let pcm = read_pcm_file(&path).unwrap();
        assert_eq!(pcm.len(), 12);
        assert_eq!(&pcm[..4], data.as_slice());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = read_pcm_file(Path::new("/nonexistent/input.wav"));
        assert!(matches!(result, Err(SpeechError::Io(_))));
    }
}
