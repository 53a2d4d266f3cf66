//! Audio chunk preprocessing.
//!
//! Browser clients ship audio as base64-wrapped WAV blobs, one chunk per
//! message. This pipeline is deterministic and holds no state beyond the
//! chunk being processed: decode base64 (stripping the data-URI prefix),
//! parse the WAV container, downmix to mono, and linear-resample to the
//! decoder's fixed 16kHz 16-bit rate.
//!
//! Every failure is logged and yields `None`; a bad chunk is dropped, never
//! fatal to the session.

use crate::defaults;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use std::io::Cursor;
use tracing::debug;

/// Mono PCM extracted from one WAV chunk, at its source rate.
#[derive(Debug, Clone, PartialEq)]
struct ParsedWav {
    samples: Vec<i16>,
    sample_rate: u32,
}

/// Converts incoming base64 audio chunks to decoder-ready PCM.
#[derive(Debug, Clone)]
pub struct AudioPreprocessor {
    audio_prefix: String,
}

impl Default for AudioPreprocessor {
    fn default() -> Self {
        Self::new(defaults::DEFAULT_AUDIO_PREFIX)
    }
}

impl AudioPreprocessor {
    /// `audio_prefix` is the data-URI prefix to strip before decoding.
    pub fn new(audio_prefix: impl Into<String>) -> Self {
        Self {
            audio_prefix: audio_prefix.into(),
        }
    }

    /// Process one chunk into 16kHz mono PCM.
    ///
    /// `None` means the chunk was malformed and must be dropped by the
    /// caller; the utterance continues.
    pub fn process_chunk(&self, chunk: &str) -> Option<Vec<i16>> {
        let wav_bytes = self.decode_base64(chunk)?;
        let parsed = parse_wav(&wav_bytes)?;
        Some(convert_rate(parsed))
    }

    fn decode_base64(&self, chunk: &str) -> Option<Vec<u8>> {
        let trimmed = chunk.strip_prefix(self.audio_prefix.as_str()).unwrap_or(chunk);
        match BASE64_STANDARD.decode(trimmed.trim()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("dropping audio chunk with invalid base64: {}", e);
                None
            }
        }
    }
}

/// Parse a WAV container from memory into mono samples plus source rate.
fn parse_wav(wav_bytes: &[u8]) -> Option<ParsedWav> {
    let mut reader = match hound::WavReader::new(Cursor::new(wav_bytes)) {
        Ok(reader) => reader,
        Err(e) => {
            debug!("dropping malformed WAV chunk: {}", e);
            return None;
        }
    };

    let spec = reader.spec();
    let raw: Vec<i16> = match reader.samples::<i16>().collect() {
        Ok(samples) => samples,
        Err(e) => {
            debug!("dropping WAV chunk with unreadable samples: {}", e);
            return None;
        }
    };

    let samples = if spec.channels == 2 {
        raw.chunks_exact(2)
            .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
            .collect()
    } else {
        raw
    };

    Some(ParsedWav {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Resample parsed audio to the decoder's fixed rate.
fn convert_rate(parsed: ParsedWav) -> Vec<i16> {
    resample(&parsed.samples, parsed.sample_rate, defaults::SAMPLE_RATE)
}

/// Standard linear-interpolation rate conversion.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / step).ceil() as usize;
    let mut out = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let pos = i as f64 * step;
        let idx = pos.floor() as usize;
        let frac = pos - idx as f64;
        let value = if idx + 1 >= samples.len() {
            samples[idx]
        } else {
            let a = samples[idx] as f64;
            let b = samples[idx + 1] as f64;
            (a + (b - a) * frac) as i16
        };
        out.push(value);
    }
    out
}
