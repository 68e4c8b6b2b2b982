//! Response envelope.
//!
//! Wire shape (one JSON object):
//!
//! ```json
//! {"correlation_id": "job-1", "status": "COMPLETED", "audio_base64": "...",
//!  "sampling_rate": 24000, "duration": 1.52, "format": "wav",
//!  "content_type": "audio/wav", "upload_url": "...", "upload_path": "...",
//!  "upload_filename": "..."}
//!
//! {"correlation_id": "job-1", "status": "FAILED", "error": "Text input is required"}
//! ```

use serde::{Deserialize, Serialize};

use crate::audio::{CONTENT_TYPE, FORMAT, TransportPayload};
use crate::storage::UploadOutcome;

/// Result of one synthesis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub correlation_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Exactly one of the success or failure shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Outcome {
    #[serde(rename = "COMPLETED")]
    Completed(AudioOutput),
    #[serde(rename = "FAILED")]
    Failed { error: String },
}

/// Success payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutput {
    pub audio_base64: String,
    pub sampling_rate: u32,
    pub duration: f64,
    pub format: String,
    pub content_type: String,
    #[serde(flatten)]
    pub upload: Option<UploadReport>,
}

/// Upload fields merged into a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadReport {
    Stored {
        upload_url: String,
        upload_path: String,
        upload_filename: String,
    },
    Failed {
        upload_error: String,
    },
}

impl From<UploadOutcome> for UploadReport {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Stored(object) => UploadReport::Stored {
                upload_url: object.url,
                upload_path: object.path,
                upload_filename: object.filename,
            },
            UploadOutcome::Failed(error) => UploadReport::Failed {
                upload_error: error,
            },
        }
    }
}

/// Build a success envelope, merging an optional upload outcome.
pub fn build_envelope(
    correlation_id: impl Into<String>,
    payload: &TransportPayload,
    upload: Option<UploadOutcome>,
) -> ResponseEnvelope {
    ResponseEnvelope {
        correlation_id: correlation_id.into(),
        outcome: Outcome::Completed(AudioOutput {
            audio_base64: payload.audio_base64.clone(),
            sampling_rate: payload.sample_rate,
            duration: payload.duration_s,
            format: FORMAT.to_string(),
            content_type: CONTENT_TYPE.to_string(),
            upload: upload.map(UploadReport::from),
        }),
    }
}

impl ResponseEnvelope {
    /// Build a failure envelope.
    pub fn failed(correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Outcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, Outcome::Completed(_))
    }

    /// `"COMPLETED"` or `"FAILED"`.
    pub fn status(&self) -> &'static str {
        match self.outcome {
            Outcome::Completed(_) => "COMPLETED",
            Outcome::Failed { .. } => "FAILED",
        }
    }
}
