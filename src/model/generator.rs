//! Maya1 token generator (Llama-3.2 3B architecture) on candle.
//!
//! The model sees the prompt built by [`crate::protocol::build_prompt`] and
//! continues with SNAC code tokens until it emits the code-end control token
//! or runs out of budget. Only the continuation is returned.
//!
//! Weights are fetched from the HuggingFace Hub: `tokenizer.json`,
//! `config.json` and either a single `model.safetensors` or the shards listed
//! in `model.safetensors.index.json`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{self, Cache, Llama, LlamaConfig};
use hf_hub::api::sync::{Api, ApiRepo};
use tokenizers::Tokenizer;

use super::{SamplingParams, TokenGenerator};
use crate::config::{CodeSpace, ControlTokens};
use crate::error::TokenizerError;
use crate::protocol::Prompt;
use crate::{Error, Result};

/// Causal LM plus tokenizer.
pub struct LlamaGenerator {
    model: Llama,
    config: llama::Config,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    stop_token: Option<u32>,
}

impl LlamaGenerator {
    /// Download (or reuse cached) files from `repo_id` and load them.
    pub fn load(repo_id: &str, device: &Device, dtype: DType) -> Result<Self> {
        let api = Api::new()?;
        let repo = api.model(repo_id.to_string());

        tracing::info!(repo = repo_id, "fetching generator files");
        let tokenizer_path = repo.get("tokenizer.json")?;
        let config_path = repo.get("config.json")?;
        let weights = hub_safetensors(&repo)?;

        Self::from_files(&tokenizer_path, &config_path, &weights, device, dtype)
    }

    /// Load from pre-downloaded model files.
    pub fn from_files(
        tokenizer_path: &Path,
        config_path: &Path,
        weights: &[PathBuf],
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| Error::WeightLoad(format!("generator tokenizer load: {e}")))?;

        let llama_config: LlamaConfig = serde_json::from_slice(&std::fs::read(config_path)?)?;
        let config = llama_config.into_config(false);

        tracing::info!(
            shards = weights.len(),
            layers = config.num_hidden_layers,
            dtype = ?dtype,
            "loading generator weights"
        );
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(weights, dtype, device)
                .map_err(|e| Error::WeightLoad(format!("generator weights: {e}")))?
        };
        let model = Llama::load(vb, &config)
            .map_err(|e| Error::WeightLoad(format!("generator model init: {e}")))?;

        tracing::info!("generator loaded");
        Ok(Self {
            model,
            config,
            tokenizer,
            device: device.clone(),
            dtype,
            stop_token: None,
        })
    }

    /// Resolve the control-token table against this model's vocabulary.
    pub fn control_tokens(&self, codes: &CodeSpace) -> Result<ControlTokens> {
        ControlTokens::resolve(|token| self.tokenizer.token_to_id(token), codes)
    }

    /// Stop sampling as soon as `id` is produced.
    pub fn with_stop_token(mut self, id: u32) -> Self {
        self.stop_token = Some(id);
        self
    }

    fn encode_text(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(TokenizerError(format!("prompt encode: {e}"))))?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl TokenGenerator for LlamaGenerator {
    fn generate(&self, prompt: &Prompt, params: &SamplingParams) -> Result<Vec<u32>> {
        use rand::Rng;

        let prompt_ids = prompt.to_token_ids(|text| self.encode_text(text))?;
        let budget = generation_budget(
            params.max_new_tokens,
            self.config.max_position_embeddings,
            prompt_ids.len(),
        );
        tracing::debug!(
            prompt_len = prompt_ids.len(),
            budget,
            temperature = params.temperature,
            "generating"
        );

        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let seed: u64 = rand::rng().random();
        let mut sampler = LogitsProcessor::new(seed, Some(params.temperature), None);

        let generated = sample_continuation(
            &prompt_ids,
            budget,
            self.stop_token,
            &mut sampler,
            &self.device,
            |input, index_pos| self.model.forward(input, index_pos, &mut cache),
        )?;
        tracing::debug!(generated = generated.len(), "generation finished");
        Ok(generated)
    }
}

/// New-token budget: the request's limit, capped so the continuation stays
/// inside the rotary tables (`max_position_embeddings`).
fn generation_budget(max_new_tokens: usize, max_positions: usize, prompt_len: usize) -> usize {
    max_new_tokens.min(max_positions.saturating_sub(prompt_len))
}

/// Autoregressive sampling loop.
///
/// `forward(input, index_pos)` returns `[1, vocab]` logits for the last
/// position of `input`. The prompt goes in once; each later step feeds only
/// the previously sampled token. Stops after `budget` tokens or right after
/// `stop_token`, which is kept in the output.
fn sample_continuation(
    prompt_ids: &[u32],
    budget: usize,
    stop_token: Option<u32>,
    sampler: &mut LogitsProcessor,
    device: &Device,
    mut forward: impl FnMut(&Tensor, usize) -> candle_core::Result<Tensor>,
) -> Result<Vec<u32>> {
    let mut generated = Vec::with_capacity(budget);
    if budget == 0 {
        return Ok(generated);
    }

    let mut input = Tensor::new(prompt_ids, device)?.unsqueeze(0)?;
    let mut index_pos = 0usize;

    for step in 0..budget {
        let seq_len = input.dim(1)?;
        let logits = forward(&input, index_pos)?;
        let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
        let next_token = sampler.sample(&logits)?;

        index_pos += seq_len;
        generated.push(next_token);

        if Some(next_token) == stop_token {
            tracing::debug!(steps = step + 1, "generator emitted code-end token");
            break;
        }
        input = Tensor::new(&[next_token], device)?.unsqueeze(0)?;
    }
    Ok(generated)
}

/// Fetch every safetensors file of a (possibly sharded) checkpoint.
fn hub_safetensors(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    let index_path = match repo.get("model.safetensors.index.json") {
        Ok(path) => path,
        Err(_) => return Ok(vec![repo.get("model.safetensors")?]),
    };

    let index: serde_json::Value = serde_json::from_slice(&std::fs::read(index_path)?)?;
    let weight_map = index
        .get("weight_map")
        .and_then(|map| map.as_object())
        .ok_or_else(|| Error::WeightLoad("safetensors index has no weight_map".into()))?;

    let shards: BTreeSet<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    shards
        .into_iter()
        .map(|shard| repo.get(shard).map_err(Error::from))
        .collect()
}
