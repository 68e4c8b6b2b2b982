//! Request orchestration.
//!
//! One job runs through fixed stages:
//!
//! ```text
//! Received → Validated → Generating → Decoding → Assembling → Completed
//!     └──────────┴────────────┴───────────┴───────────┴──────→ Failed
//! ```
//!
//! 1. Validate the request (no generation on failure)
//! 2. Build the prompt and run the token generator
//! 3. Extract the code region and unpack SNAC frames; no frames is terminal
//! 4. Decode to a waveform, encode to WAV/base64
//! 5. Optionally upload (best effort) and build the envelope
//!
//! Every outcome, including failures, is a [`ResponseEnvelope`] carrying the
//! job's correlation id.

use serde::{Deserialize, Serialize};

use crate::audio::assemble;
use crate::config::{
    CodeSpace, ControlTokens, DEFAULT_VOICE_DESCRIPTION, default_max_new_tokens,
    default_temperature,
};
use crate::model::{CodecDecoder, SamplingParams, TokenGenerator};
use crate::protocol::{build_prompt, extract_code_tokens, unpack_frames};
use crate::response::{ResponseEnvelope, build_envelope};
use crate::storage::StorageUploader;
use crate::{Error, ErrorKind, Result};

/// Inbound synthesis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    #[serde(default)]
    pub text: String,

    #[serde(default = "default_voice_description")]
    pub voice_description: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    #[serde(default, alias = "upload_to_firebase")]
    pub upload_requested: bool,

    #[serde(default, alias = "firebase_user_id")]
    pub upload_destination_id: String,
}

fn default_voice_description() -> String {
    DEFAULT_VOICE_DESCRIPTION.into()
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            voice_description: default_voice_description(),
            temperature: default_temperature(),
            max_new_tokens: default_max_new_tokens(),
            upload_requested: false,
            upload_destination_id: String::new(),
        }
    }
}

/// A request plus its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default = "default_job_id")]
    pub id: String,
    #[serde(default)]
    pub input: SynthesisRequest,
}

fn default_job_id() -> String {
    "unknown".into()
}

impl Job {
    pub fn new(id: impl Into<String>, input: SynthesisRequest) -> Self {
        Self {
            id: id.into(),
            input,
        }
    }
}

/// A request that passed validation. Read-only from here on.
#[derive(Debug, Clone)]
pub struct ValidatedRequest(SynthesisRequest);

impl SynthesisRequest {
    /// Check required fields.
    pub fn validate(self) -> Result<ValidatedRequest> {
        if self.text.is_empty() {
            return Err(Error::Validation("Text input is required".into()));
        }
        if self.upload_requested && self.upload_destination_id.is_empty() {
            return Err(Error::Validation(
                "upload_destination_id is required when upload_requested is true".into(),
            ));
        }
        // A quote would close the description="..." attribute early.
        if self.voice_description.contains('"') {
            return Err(Error::Validation(
                "voice_description must not contain double quotes".into(),
            ));
        }
        Ok(ValidatedRequest(self))
    }
}

impl ValidatedRequest {
    pub fn text(&self) -> &str {
        &self.0.text
    }

    pub fn voice_description(&self) -> &str {
        &self.0.voice_description
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.0.temperature,
            max_new_tokens: self.0.max_new_tokens,
        }
    }

    /// Destination id when an upload was requested.
    pub fn upload_destination(&self) -> Option<&str> {
        self.0
            .upload_requested
            .then_some(self.0.upload_destination_id.as_str())
    }
}

/// Processing stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Generating,
    Decoding,
    Assembling,
    Completed,
    Failed,
}

/// The resident models and collaborators shared by every job.
pub struct SpeechPipeline {
    generator: Box<dyn TokenGenerator>,
    codec: Box<dyn CodecDecoder>,
    uploader: Box<dyn StorageUploader>,
    control: ControlTokens,
    codes: CodeSpace,
}

impl SpeechPipeline {
    pub fn new(
        generator: Box<dyn TokenGenerator>,
        codec: Box<dyn CodecDecoder>,
        uploader: Box<dyn StorageUploader>,
        control: ControlTokens,
        codes: CodeSpace,
    ) -> Self {
        Self {
            generator,
            codec,
            uploader,
            control,
            codes,
        }
    }

    /// Run one job to completion. Never fails: errors become a FAILED envelope.
    pub fn handle(&self, job: Job) -> ResponseEnvelope {
        let Job { id, input } = job;
        let mut stage = Stage::Received;

        match self.run(&id, input, &mut stage) {
            Ok(envelope) => {
                advance(&mut stage, Stage::Completed, &id);
                envelope
            }
            Err(error) => {
                let failed_at = stage;
                advance(&mut stage, Stage::Failed, &id);
                match error.kind() {
                    ErrorKind::Validation | ErrorKind::GenerationEmpty => {
                        tracing::warn!(correlation_id = %id, stage = ?failed_at, %error, "job rejected")
                    }
                    _ => {
                        tracing::error!(correlation_id = %id, stage = ?failed_at, error = ?error, "job failed")
                    }
                }
                ResponseEnvelope::failed(id, error.to_string())
            }
        }
    }

    fn run(&self, id: &str, input: SynthesisRequest, stage: &mut Stage) -> Result<ResponseEnvelope> {
        let request = input.validate()?;
        advance(stage, Stage::Validated, id);

        advance(stage, Stage::Generating, id);
        let prompt = build_prompt(&self.control, request.voice_description(), request.text());
        tracing::debug!(correlation_id = %id, prompt = %prompt.render(), "prompt");
        let raw = self.generator.generate(&prompt, &request.sampling())?;

        advance(stage, Stage::Decoding, id);
        let codes = extract_code_tokens(&raw, &self.control, &self.codes);
        if codes.is_empty() {
            return Err(Error::GenerationEmpty(format!(
                "none of the {} generated tokens were audio codes",
                raw.len()
            )));
        }
        let streams = unpack_frames(&codes, &self.control, &self.codes);
        if streams.is_empty() {
            return Err(Error::GenerationEmpty(format!(
                "{} audio-code tokens do not fill a single frame",
                codes.len()
            )));
        }
        tracing::info!(
            correlation_id = %id,
            generated = raw.len(),
            codes = codes.len(),
            frames = streams.frames(),
            "extracted audio frames"
        );
        let audio = self.codec.decode(&streams)?;

        advance(stage, Stage::Assembling, id);
        let payload = assemble(&audio)?;
        let upload = request
            .upload_destination()
            .map(|destination| self.uploader.upload(&payload.wav, destination, request.text()));

        tracing::info!(
            correlation_id = %id,
            duration_s = payload.duration_s,
            uploaded = upload.is_some(),
            "job completed"
        );
        Ok(build_envelope(id, &payload, upload))
    }
}

fn advance(stage: &mut Stage, next: Stage, id: &str) {
    tracing::debug!(correlation_id = %id, from = ?*stage, to = ?next, "stage");
    *stage = next;
}
