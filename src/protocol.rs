//! Audio token protocol between the language model and the SNAC codec.
//!
//! ```text
//! [SOH] [BOS] <description="..."> text [EOT] [EOH] [SOA] [SOS]
//!                                                          │
//!                         generator continues from here ───┘
//!
//! output: c c c c c c c │ c c c c c c c │ ... [EOS]
//!         └── frame 0 ──┘ └── frame 1 ──┘
//!
//! frame slots:  0 → L1    1,4 → L2    2,3,5,6 → L3
//! ```
//!
//! - [`prompt`] — control-token-delimited prompt assembly
//! - [`scanner`] — code-region extraction from raw generator output
//! - [`frame`] — 7-slot frame de-interleaving into hierarchical code streams

pub mod frame;
pub mod prompt;
pub mod scanner;

pub use frame::{CodeStreams, pack_frames, unpack_frames};
pub use prompt::{Prompt, PromptSegment, build_prompt};
pub use scanner::extract_code_tokens;
