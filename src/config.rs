//! Configuration: control-token table, audio-code space, model sources, storage.
//!
//! Defaults mirror the Maya1 vocabulary (Llama-3 tokenizer extended with
//! `<custom_token_N>` entries at `128256 + N`) and the 24 kHz SNAC profile.

use crate::{Error, Result};

/// SNAC 24 kHz output sample rate.
pub const SAMPLE_RATE: u32 = 24_000;

/// Number of audio-code tokens per frame.
pub const TOKENS_PER_FRAME: usize = 7;

/// Default voice description when the request omits one.
pub const DEFAULT_VOICE_DESCRIPTION: &str = "neutral voice, clear speech";

/// A structural role in the combined text/audio token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlRole {
    StartOfHeader,
    EndOfHeader,
    StartOfAudio,
    BeginOfSequence,
    EndOfText,
    CodeStart,
    CodeEnd,
}

impl ControlRole {
    pub const ALL: [ControlRole; 7] = [
        ControlRole::StartOfHeader,
        ControlRole::EndOfHeader,
        ControlRole::StartOfAudio,
        ControlRole::BeginOfSequence,
        ControlRole::EndOfText,
        ControlRole::CodeStart,
        ControlRole::CodeEnd,
    ];

    /// Short display name used when rendering prompts for logs.
    pub fn name(self) -> &'static str {
        match self {
            ControlRole::StartOfHeader => "SOH",
            ControlRole::EndOfHeader => "EOH",
            ControlRole::StartOfAudio => "SOA",
            ControlRole::BeginOfSequence => "BOS",
            ControlRole::EndOfText => "EOT",
            ControlRole::CodeStart => "SOS",
            ControlRole::CodeEnd => "EOS",
        }
    }

    /// Token string for this role in the Maya1 tokenizer vocabulary.
    pub fn vocab_token(self) -> &'static str {
        match self {
            ControlRole::StartOfHeader => "<custom_token_3>",
            ControlRole::EndOfHeader => "<custom_token_4>",
            ControlRole::StartOfAudio => "<custom_token_5>",
            ControlRole::BeginOfSequence => "<|begin_of_text|>",
            ControlRole::EndOfText => "<|eot_id|>",
            ControlRole::CodeStart => "<custom_token_1>",
            ControlRole::CodeEnd => "<custom_token_2>",
        }
    }
}

/// Role → token id table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTokens {
    pub start_of_header: u32,
    pub end_of_header: u32,
    pub start_of_audio: u32,
    pub begin_of_sequence: u32,
    pub end_of_text: u32,
    pub code_start: u32,
    pub code_end: u32,
}

impl Default for ControlTokens {
    fn default() -> Self {
        Self {
            start_of_header: 128259,
            end_of_header: 128260,
            start_of_audio: 128261,
            begin_of_sequence: 128000,
            end_of_text: 128009,
            code_start: 128257,
            code_end: 128258,
        }
    }
}

impl ControlTokens {
    pub fn get(&self, role: ControlRole) -> u32 {
        match role {
            ControlRole::StartOfHeader => self.start_of_header,
            ControlRole::EndOfHeader => self.end_of_header,
            ControlRole::StartOfAudio => self.start_of_audio,
            ControlRole::BeginOfSequence => self.begin_of_sequence,
            ControlRole::EndOfText => self.end_of_text,
            ControlRole::CodeStart => self.code_start,
            ControlRole::CodeEnd => self.code_end,
        }
    }

    fn slot_mut(&mut self, role: ControlRole) -> &mut u32 {
        match role {
            ControlRole::StartOfHeader => &mut self.start_of_header,
            ControlRole::EndOfHeader => &mut self.end_of_header,
            ControlRole::StartOfAudio => &mut self.start_of_audio,
            ControlRole::BeginOfSequence => &mut self.begin_of_sequence,
            ControlRole::EndOfText => &mut self.end_of_text,
            ControlRole::CodeStart => &mut self.code_start,
            ControlRole::CodeEnd => &mut self.code_end,
        }
    }

    /// Resolve every role against a vocabulary lookup.
    ///
    /// Roles whose token string is missing from the vocabulary keep their
    /// default id. The result is validated against `codes`.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<u32>,
        codes: &CodeSpace,
    ) -> Result<Self> {
        let mut tokens = Self::default();
        for role in ControlRole::ALL {
            match lookup(role.vocab_token()) {
                Some(id) => *tokens.slot_mut(role) = id,
                None => tracing::warn!(
                    role = role.name(),
                    token = role.vocab_token(),
                    default_id = tokens.get(role),
                    "control token not in vocabulary, keeping default id"
                ),
            }
        }
        tokens.validate(codes)?;
        Ok(tokens)
    }

    /// Check that control ids are distinct and disjoint from the code range.
    pub fn validate(&self, codes: &CodeSpace) -> Result<()> {
        for (i, role) in ControlRole::ALL.iter().enumerate() {
            let id = self.get(*role);
            if codes.contains(id) {
                return Err(Error::Config(format!(
                    "control token {} ({id}) overlaps the audio-code range [{}, {}]",
                    role.name(),
                    codes.min_code,
                    codes.max_code
                )));
            }
            if let Some(other) = ControlRole::ALL[i + 1..]
                .iter()
                .find(|other| self.get(**other) == id)
            {
                return Err(Error::Config(format!(
                    "control tokens {} and {} share id {id}",
                    role.name(),
                    other.name()
                )));
            }
        }
        Ok(())
    }
}

/// The audio-code id range and its mapping onto codec symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSpace {
    /// Additive offset from codec symbol space; also the smallest valid id.
    pub min_code: u32,
    /// Largest valid id (inclusive).
    pub max_code: u32,
    /// Symbols per codebook.
    pub codebook_size: u32,
}

impl Default for CodeSpace {
    fn default() -> Self {
        Self {
            min_code: 128266,
            max_code: 156937,
            codebook_size: 4096,
        }
    }
}

impl CodeSpace {
    pub fn offset(&self) -> u32 {
        self.min_code
    }

    pub fn contains(&self, id: u32) -> bool {
        (self.min_code..=self.max_code).contains(&id)
    }

    /// Codec symbol for a token id: `(id - offset) mod codebook_size`.
    pub fn symbol(&self, id: u32) -> u32 {
        let offset = i64::from(self.offset());
        (i64::from(id) - offset).rem_euclid(i64::from(self.codebook_size)) as u32
    }

    /// Token id for a codec symbol.
    pub fn token(&self, symbol: u32) -> u32 {
        self.offset() + symbol
    }
}

pub(crate) fn default_temperature() -> f64 {
    0.7
}

pub(crate) fn default_max_new_tokens() -> usize {
    2000
}

/// Where model weights come from on the HuggingFace Hub.
#[derive(Debug, Clone)]
pub struct ModelSource {
    /// Generator repo (tokenizer, config and sharded safetensors).
    pub generator_repo: String,
    /// Repo holding the SNAC `config.json`.
    pub codec_config_repo: String,
    /// Repo holding the SNAC safetensors.
    pub codec_weights_repo: String,
    pub codec_weights_file: String,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self {
            generator_repo: "maya-research/maya1".into(),
            codec_config_repo: "hubertsiuzdak/snac_24khz".into(),
            codec_weights_repo: "lmz/candle-snac".into(),
            codec_weights_file: "snac_24khz.safetensors".into(),
        }
    }
}

/// Object storage settings. Upload is disabled unless bucket and token are set.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub access_token: Option<String>,
    pub endpoint: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            access_token: None,
            endpoint: default_storage_endpoint(),
        }
    }
}

fn default_storage_endpoint() -> String {
    "https://storage.googleapis.com".into()
}

impl StorageConfig {
    /// Read `STORAGE_BUCKET` (or `FIREBASE_STORAGE_BUCKET`),
    /// `STORAGE_ACCESS_TOKEN` and `STORAGE_ENDPOINT` from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            bucket: non_empty("STORAGE_BUCKET").or_else(|| non_empty("FIREBASE_STORAGE_BUCKET")),
            access_token: non_empty("STORAGE_ACCESS_TOKEN"),
            endpoint: non_empty("STORAGE_ENDPOINT").unwrap_or_else(default_storage_endpoint),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bucket.is_some() && self.access_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_control_tokens_are_valid() {
        let tokens = ControlTokens::default();
        tokens.validate(&CodeSpace::default()).unwrap();
        assert_eq!(tokens.get(ControlRole::CodeEnd), 128258);
        assert!(ControlRole::ALL.iter().all(|&role| !CodeSpace::default().contains(tokens.get(role))));
    }

    #[test]
    fn test_validate_rejects_overlap_with_code_range() {
        let tokens = ControlTokens {
            code_end: 128300,
            ..ControlTokens::default()
        };
        let err = tokens.validate(&CodeSpace::default()).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let tokens = ControlTokens {
            end_of_header: 128259,
            ..ControlTokens::default()
        };
        let err = tokens.validate(&CodeSpace::default()).unwrap_err();
        assert!(err.to_string().contains("share id"));
    }

    #[test]
    fn test_resolve_uses_vocabulary_and_falls_back() {
        let vocab: HashMap<&str, u32> =
            [("<custom_token_2>", 130000), ("<|eot_id|>", 128009)].into();
        let tokens = ControlTokens::resolve(|t| vocab.get(t).copied(), &CodeSpace {
            min_code: 140000,
            max_code: 150000,
            codebook_size: 4096,
        })
        .unwrap();
        assert_eq!(tokens.code_end, 130000);
        assert_eq!(tokens.end_of_text, 128009);
        assert_eq!(tokens.start_of_header, 128259);
    }

    #[test]
    fn test_code_space_symbol_mapping() {
        let codes = CodeSpace::default();
        assert_eq!(codes.offset(), 128266);
        assert_eq!(codes.symbol(128266), 0);
        assert_eq!(codes.symbol(128270), 4);
        assert_eq!(codes.symbol(128266 + 4096), 0);
        assert_eq!(codes.symbol(156937), (156937 - 128266) % 4096);
        assert_eq!(codes.token(5), 128271);
        assert!(codes.contains(156937));
        assert!(!codes.contains(156938));
        assert!(!codes.contains(128258));
    }

    #[test]
    fn test_storage_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("FIREBASE_STORAGE_BUCKET", "bucket-a"),
            ("STORAGE_ACCESS_TOKEN", "tok"),
            ("STORAGE_ENDPOINT", " "),
        ]
        .into();
        let config = StorageConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.bucket.as_deref(), Some("bucket-a"));
        assert_eq!(config.endpoint, "https://storage.googleapis.com");
        assert!(config.is_configured());

        let empty = StorageConfig::from_lookup(|_| None);
        assert!(!empty.is_configured());
    }
}
