//! Prompt assembly.
//!
//! The prompt is kept as segments rather than a flat string so that control
//! tokens never pass through the text tokenizer: only the content segment is
//! encoded, the control ids are spliced in directly.

use crate::Result;
use crate::config::{ControlRole, ControlTokens};

/// One piece of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSegment {
    Control(ControlRole, u32),
    Text(String),
}

/// A fully assembled generator prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    segments: Vec<PromptSegment>,
}

/// Build the generator prompt for a voice description and text.
///
/// Both strings are embedded verbatim.
pub fn build_prompt(tokens: &ControlTokens, description: &str, text: &str) -> Prompt {
    let control = |role: ControlRole| PromptSegment::Control(role, tokens.get(role));
    Prompt {
        segments: vec![
            control(ControlRole::StartOfHeader),
            control(ControlRole::BeginOfSequence),
            PromptSegment::Text(format!("<description=\"{description}\"> {text}")),
            control(ControlRole::EndOfText),
            control(ControlRole::EndOfHeader),
            control(ControlRole::StartOfAudio),
            control(ControlRole::CodeStart),
        ],
    }
}

impl Prompt {
    pub fn segments(&self) -> &[PromptSegment] {
        &self.segments
    }

    /// Flatten to token ids, encoding text segments with `encode`.
    ///
    /// `encode` must not add special tokens of its own.
    pub fn to_token_ids<F>(&self, mut encode: F) -> Result<Vec<u32>>
    where
        F: FnMut(&str) -> Result<Vec<u32>>,
    {
        let mut ids = Vec::new();
        for segment in &self.segments {
            match segment {
                PromptSegment::Control(_, id) => ids.push(*id),
                PromptSegment::Text(text) => ids.extend(encode(text)?),
            }
        }
        Ok(ids)
    }

    /// Human-readable rendering with control tokens shown as `[ROLE]`.
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                PromptSegment::Control(role, _) => format!("[{}]", role.name()),
                PromptSegment::Text(text) => text.clone(),
            })
            .collect()
    }
}
