//! Expressive text-to-speech worker in pure Rust.
//!
//! Drives a Maya1-style causal LM that speaks in SNAC audio-code tokens,
//! decodes the codes with the 24 kHz SNAC codec, and returns WAV audio as a
//! base64 transport payload. Models run on candle.
//!
//! ## Architecture
//!
//! ```text
//! job ─→ validate ─→ prompt ─→ LM generate ─→ scan code region
//!                                                  ↓
//!   envelope ←─ upload? ←─ WAV/base64 ←─ SNAC decode ←─ unpack 7-token frames
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — prompt layout, code-region scanning, frame codec
//! - [`model`] — generator and codec backends behind small traits
//! - [`audio`] — audio buffers, WAV bytes, transport payload
//! - [`response`] — the COMPLETED/FAILED response envelope
//! - [`storage`] — best-effort object storage upload
//! - [`pipeline`] — per-job orchestration
//! - [`manager`] — resident models and the sequential job worker
//! - [`config`] — control tokens, code space, model sources, storage settings

pub mod audio;
pub mod config;
pub mod manager;
pub mod model;
pub mod pipeline;
pub mod protocol;
pub mod response;
pub mod storage;

mod error;

pub use error::{Error, ErrorKind, Result};
