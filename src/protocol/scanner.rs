//! Code-region extraction from raw generator output.

use crate::config::{CodeSpace, ControlTokens};

/// Extract the audio-code tokens from generator output.
///
/// The region ends at the first `code_end` token (exclusive). When the model
/// hit its length limit instead, there is no end marker and the whole
/// sequence is in-region. Within the region, only ids in the code range are
/// kept, in order.
pub fn extract_code_tokens(tokens: &[u32], control: &ControlTokens, codes: &CodeSpace) -> Vec<u32> {
    let end = tokens
        .iter()
        .position(|&id| id == control.code_end)
        .unwrap_or(tokens.len());

    tokens[..end]
        .iter()
        .copied()
        .filter(|&id| codes.contains(id))
        .collect()
}
