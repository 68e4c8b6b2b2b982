//! Audio buffers and transport encoding.
//!
//! Decoded speech is mono f32 at 24 kHz. For transport it is packed into a
//! 16-bit PCM WAV container and base64-encoded.

mod payload;
mod wav;

pub use payload::{CONTENT_TYPE, FORMAT, TransportPayload, assemble, round_duration};
pub use wav::{read_wav_bytes, write_wav_bytes};

/// Decoded PCM samples plus their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Mono samples in [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds.
    pub fn duration_s(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
