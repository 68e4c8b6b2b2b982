//! Model backends behind the synthesis pipeline.
//!
//! The pipeline only sees two seams:
//!
//! - [`TokenGenerator`] — prompt → raw output token ids (prompt excluded)
//! - [`CodecDecoder`] — hierarchical code streams → waveform
//!
//! ## Components
//!
//! - [`generator`] — Llama-architecture causal LM (Maya1) on candle
//! - [`codec`] — SNAC 24 kHz decoder on candle

pub mod codec;
pub mod generator;

use crate::Result;
use crate::audio::AudioBuffer;
use crate::protocol::{CodeStreams, Prompt};

/// Per-request sampling bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_new_tokens: usize,
}

/// Autoregressive text/audio token generator.
pub trait TokenGenerator: Send {
    /// Continue `prompt`; return only the newly generated ids.
    fn generate(&self, prompt: &Prompt, params: &SamplingParams) -> Result<Vec<u32>>;
}

/// Multi-scale codec decode transform.
pub trait CodecDecoder: Send {
    /// Decode code streams into audio. Malformed streams are a codec error.
    fn decode(&self, streams: &CodeStreams) -> Result<AudioBuffer>;
}
