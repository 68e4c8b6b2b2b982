//! Synthesis manager — keeps the models resident and queues jobs.
//!
//! The manager owns one [`SpeechPipeline`], built eagerly at startup on a
//! blocking thread. Callers submit [`Job`]s which are processed sequentially
//! by a single dedicated worker; each job runs to completion before the next
//! is taken.
//!
//! # Example
//!
//! ```no_run
//! use maya_tts_rs::manager::{ManagerConfig, SynthesisManager};
//! use maya_tts_rs::pipeline::{Job, SynthesisRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SynthesisManager::start(ManagerConfig::default()).await.unwrap();
//!     let request = SynthesisRequest { text: "Hello!".into(), ..Default::default() };
//!     let envelope = manager.synthesize(Job::new("job-1", request)).await.unwrap();
//!     println!("{}", envelope.status());
//! }
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};

use candle_core::{DType, Device};
use tokio::sync::{mpsc, oneshot};

use crate::config::{CodeSpace, ModelSource, StorageConfig};
use crate::model::codec::SnacDecoder;
use crate::model::generator::LlamaGenerator;
use crate::pipeline::{Job, SpeechPipeline};
use crate::response::ResponseEnvelope;
use crate::storage::uploader_from_config;
use crate::{Error, Result};

/// Configuration for the synthesis manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// CUDA device ordinal (0 = first GPU). Ignored when CUDA is unavailable.
    pub cuda_device: usize,

    /// Hub repositories for the generator and codec.
    pub model: ModelSource,

    /// Object storage for optional uploads.
    pub storage: StorageConfig,

    /// Jobs that may wait for the worker before `synthesize` applies backpressure.
    pub queue_depth: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cuda_device: 0,
            model: ModelSource::default(),
            storage: StorageConfig::default(),
            queue_depth: 64,
        }
    }
}

/// A submitted job.
struct PendingJob {
    job: Job,
    reply: oneshot::Sender<ResponseEnvelope>,
}

/// Handle for submitting jobs to a running manager.
#[derive(Clone)]
pub struct SynthesisManager {
    tx: mpsc::Sender<PendingJob>,
}

impl SynthesisManager {
    /// Load the models and start the worker.
    ///
    /// Downloads weights from HuggingFace if needed. Returns an error if the
    /// initial load fails.
    pub async fn start(config: ManagerConfig) -> Result<Self> {
        let queue_depth = config.queue_depth;
        let pipeline = tokio::task::spawn_blocking(move || load_pipeline(&config))
            .await
            .map_err(|join_error| Error::Manager(format!("pipeline load task panicked: {join_error}")))?
            .map_err(|e| Error::Manager(format!("pipeline load failed: {e}")))?;

        Ok(Self::with_pipeline(pipeline, queue_depth))
    }

    /// Start a worker around an already-built pipeline.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_pipeline(pipeline: SpeechPipeline, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<PendingJob>(queue_depth.max(1));
        tokio::task::spawn_blocking(move || run_manager(pipeline, rx));
        Self { tx }
    }

    /// Submit a job and wait for its envelope.
    ///
    /// Job failures come back as FAILED envelopes; `Err` means the manager
    /// itself is gone.
    pub async fn synthesize(&self, job: Job) -> Result<ResponseEnvelope> {
        let (reply_tx, reply_rx) = oneshot::channel::<ResponseEnvelope>();
        self.tx
            .send(PendingJob {
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Manager("manager has shut down".into()))?;

        reply_rx
            .await
            .map_err(|_| Error::Manager("manager dropped reply channel".into()))
    }
}

/// The manager loop — runs in a dedicated blocking thread.
fn run_manager(pipeline: SpeechPipeline, mut rx: mpsc::Receiver<PendingJob>) {
    while let Some(pending) = rx.blocking_recv() {
        let correlation_id = pending.job.id.clone();
        let envelope = catch_unwind(AssertUnwindSafe(|| pipeline.handle(pending.job)))
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                tracing::error!(correlation_id = %correlation_id, panic = %message, "job panicked");
                ResponseEnvelope::failed(correlation_id, format!("internal error: {message}"))
            });
        // Ignore send errors — caller may have timed out.
        let _ = pending.reply.send(envelope);
    }
    tracing::info!("synthesis manager shut down");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Load generator, codec and uploader, and wire them into a pipeline.
pub fn load_pipeline(config: &ManagerConfig) -> Result<SpeechPipeline> {
    let device = preferred_device(config.cuda_device);
    let dtype = generator_dtype(&device);
    tracing::info!(device = ?device, dtype = ?dtype, repo = %config.model.generator_repo, "loading models");

    let codes = CodeSpace::default();
    let generator = LlamaGenerator::load(&config.model.generator_repo, &device, dtype)?;
    let control = generator.control_tokens(&codes)?;
    let generator = generator.with_stop_token(control.code_end);

    let codec = SnacDecoder::load(&config.model, &device)?;
    let uploader = uploader_from_config(&config.storage)?;

    tracing::info!(control = ?control, "models ready");
    Ok(SpeechPipeline::new(
        Box::new(generator),
        Box::new(codec),
        uploader,
        control,
        codes,
    ))
}

/// Return the preferred device: CUDA if available, otherwise CPU.
pub fn preferred_device(cuda_ordinal: usize) -> Device {
    Device::cuda_if_available(cuda_ordinal).unwrap_or(Device::Cpu)
}

/// BF16 on CUDA, F32 elsewhere.
pub fn generator_dtype(device: &Device) -> DType {
    if device.is_cuda() {
        DType::BF16
    } else {
        DType::F32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::config::ControlTokens;
    use crate::model::{CodecDecoder, SamplingParams, TokenGenerator};
    use crate::pipeline::SynthesisRequest;
    use crate::protocol::{CodeStreams, Prompt};
    use crate::storage::DisabledUploader;

    struct FixedGenerator(Vec<u32>);

    impl TokenGenerator for FixedGenerator {
        fn generate(&self, prompt: &Prompt, _params: &SamplingParams) -> Result<Vec<u32>> {
            if prompt.render().contains("panic please") {
                panic!("generator blew up");
            }
            Ok(self.0.clone())
        }
    }

    struct SilentCodec;

    impl CodecDecoder for SilentCodec {
        fn decode(&self, streams: &CodeStreams) -> Result<AudioBuffer> {
            Ok(AudioBuffer::new(vec![0.0; streams.frames() * 2048], 24000))
        }
    }

    fn test_pipeline() -> SpeechPipeline {
        let frame: Vec<u32> = (0..7).map(|s| 128266 + s).collect();
        SpeechPipeline::new(
            Box::new(FixedGenerator(frame)),
            Box::new(SilentCodec),
            Box::new(DisabledUploader),
            ControlTokens::default(),
            CodeSpace::default(),
        )
    }

    fn job(id: &str, text: &str) -> Job {
        Job::new(
            id,
            SynthesisRequest {
                text: text.into(),
                ..SynthesisRequest::default()
            },
        )
    }

    #[test]
    fn test_manager_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.cuda_device, 0);
        assert_eq!(config.queue_depth, 64);
        assert_eq!(config.model.generator_repo, "maya-research/maya1");
        assert!(!config.storage.is_configured());
    }

    #[test]
    fn test_generator_dtype_on_cpu() {
        assert_eq!(generator_dtype(&Device::Cpu), DType::F32);
    }

    #[tokio::test]
    async fn test_jobs_are_answered_in_order() {
        let manager = SynthesisManager::with_pipeline(test_pipeline(), 4);
        let first = manager.synthesize(job("a", "hello")).await.unwrap();
        let second = manager.synthesize(job("b", "")).await.unwrap();
        assert_eq!(first.correlation_id, "a");
        assert!(first.is_completed());
        assert_eq!(second.correlation_id, "b");
        assert_eq!(second.status(), "FAILED");
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_failed_envelope() {
        let manager = SynthesisManager::with_pipeline(test_pipeline(), 4);
        let envelope = manager.synthesize(job("p", "panic please")).await.unwrap();
        assert_eq!(envelope.correlation_id, "p");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"], "internal error: generator blew up");

        // Worker survives the panic.
        let next = manager.synthesize(job("q", "hello")).await.unwrap();
        assert!(next.is_completed());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static msg");
        assert_eq!(panic_message(boxed.as_ref()), "static msg");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
