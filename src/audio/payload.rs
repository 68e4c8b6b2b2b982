//! Transport payload: WAV container bytes, base64 text, duration.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::AudioBuffer;
use super::wav::write_wav_bytes;
use crate::Result;

/// Container format name reported to callers.
pub const FORMAT: &str = "wav";

/// MIME type of the container.
pub const CONTENT_TYPE: &str = "audio/wav";

/// Encoded audio ready to be embedded in a response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportPayload {
    /// Raw WAV bytes (kept for storage upload).
    pub wav: Vec<u8>,
    /// Base64 of `wav`.
    pub audio_base64: String,
    pub sample_rate: u32,
    /// Seconds, rounded to 2 decimals.
    pub duration_s: f64,
}

/// Encode a decoded waveform for transport.
pub fn assemble(audio: &AudioBuffer) -> Result<TransportPayload> {
    let wav = write_wav_bytes(&audio.samples, audio.sample_rate)?;
    let audio_base64 = STANDARD.encode(&wav);
    Ok(TransportPayload {
        wav,
        audio_base64,
        sample_rate: audio.sample_rate,
        duration_s: round_duration(audio.duration_s()),
    })
}

/// Round seconds to 2 decimal places.
pub fn round_duration(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
