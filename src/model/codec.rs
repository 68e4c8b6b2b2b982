//! SNAC 24 kHz decoder on candle.

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::snac;
use hf_hub::api::sync::Api;

use super::CodecDecoder;
use crate::audio::AudioBuffer;
use crate::config::ModelSource;
use crate::protocol::CodeStreams;
use crate::{Error, Result};

/// SNAC model loaded for decoding only.
pub struct SnacDecoder {
    model: snac::Model,
    device: Device,
    sample_rate: u32,
    codebook_size: u32,
}

impl SnacDecoder {
    /// Fetch config and weights from the Hub and load them on `device`.
    pub fn load(source: &ModelSource, device: &Device) -> Result<Self> {
        let api = Api::new()?;
        let config_path = api
            .model(source.codec_config_repo.clone())
            .get("config.json")?;
        let weights_path = api
            .model(source.codec_weights_repo.clone())
            .get(&source.codec_weights_file)?;

        let config: snac::Config = serde_json::from_slice(&std::fs::read(config_path)?)?;
        tracing::info!(
            sample_rate = config.sampling_rate,
            codebook_size = config.codebook_size,
            "loading SNAC decoder"
        );

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)
                .map_err(|e| Error::WeightLoad(format!("SNAC weights: {e}")))?
        };
        let model = snac::Model::new(&config, vb)
            .map_err(|e| Error::WeightLoad(format!("SNAC model init: {e}")))?;

        Ok(Self {
            model,
            device: device.clone(),
            sample_rate: config.sampling_rate as u32,
            codebook_size: config.codebook_size as u32,
        })
    }

    fn run(&self, streams: &CodeStreams) -> candle_core::Result<Vec<f32>> {
        // Each level becomes a [1, T_level] index tensor.
        let codes = [&streams.l1, &streams.l2, &streams.l3]
            .iter()
            .map(|level| Tensor::new(level.as_slice(), &self.device)?.unsqueeze(0))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let codes: Vec<&Tensor> = codes.iter().collect();

        // [1, 1, samples]
        let pcm = self.model.decode(&codes)?;
        pcm.i((0, 0))?.to_dtype(DType::F32)?.to_vec1::<f32>()
    }
}

impl CodecDecoder for SnacDecoder {
    fn decode(&self, streams: &CodeStreams) -> Result<AudioBuffer> {
        streams.validate(self.codebook_size)?;
        if streams.frames() == 0 {
            return Err(Error::Codec("no frames to decode".into()));
        }

        let samples = self
            .run(streams)
            .map_err(|e| Error::Codec(e.to_string()))?;
        tracing::debug!(
            frames = streams.frames(),
            samples = samples.len(),
            "decoded SNAC frames"
        );
        Ok(AudioBuffer::new(samples, self.sample_rate))
    }
}
