use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::{mistral, qwen2};
use tracing::info;

use crate::{
    error::{CoreError, CoreResult},
    generation::GenerationConfig,
    llama::LlamaModel,
    model::{Architecture, HfConfig, Model},
    pipeline::TextGenerator,
    tokenizer::Tokenizer,
};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";
const SAFETENSORS_SINGLE: &str = "model.safetensors";

/// A model of any supported family, dispatched by [`Architecture`].
pub enum AnyModel {
    Llama(LlamaModel),
    Mistral(mistral::Model),
    Qwen2(qwen2::ModelForCausalLM),
}

impl std::fmt::Debug for AnyModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnyModel::{}", self.architecture())
    }
}

impl AnyModel {
    /// Build the weights of `architecture` from the safetensors in `model_dir`.
    pub fn load(
        model_dir: &Path,
        config_json: &str,
        architecture: Architecture,
        device: &Device,
        dtype: DType,
    ) -> CoreResult<Self> {
        let weights = weight_files(model_dir)?;
        info!(%architecture, shards = weights.len(), ?dtype, "Loading weights");
        // SAFETY: the cache never rewrites a file in place (downloads land in
        // a temp file and are renamed), so the mapped files stay valid.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, dtype, device)? };

        let model = match architecture {
            Architecture::Llama => Self::Llama(LlamaModel::load(config_json, vb, device, dtype)?),
            Architecture::Mistral => {
                let config: mistral::Config = serde_json::from_str(config_json)?;
                Self::Mistral(mistral::Model::new(&config, vb)?)
            }
            Architecture::Qwen2 => {
                let config: qwen2::Config = serde_json::from_str(config_json)?;
                Self::Qwen2(qwen2::ModelForCausalLM::new(&config, vb)?)
            }
        };
        Ok(model)
    }
}

impl Model for AnyModel {
    fn forward(&mut self, input_ids: &Tensor, seqlen_offset: usize) -> CoreResult<Tensor> {
        match self {
            Self::Llama(m) => m.forward(input_ids, seqlen_offset),
            Self::Mistral(m) => Ok(m.forward(input_ids, seqlen_offset)?),
            Self::Qwen2(m) => Ok(m.forward(input_ids, seqlen_offset)?),
        }
    }

    fn clear_cache(&mut self) -> CoreResult<()> {
        match self {
            Self::Llama(m) => m.clear_cache()?,
            Self::Mistral(m) => m.clear_kv_cache(),
            Self::Qwen2(m) => m.clear_kv_cache(),
        }
        Ok(())
    }

    fn architecture(&self) -> Architecture {
        match self {
            Self::Llama(_) => Architecture::Llama,
            Self::Mistral(_) => Architecture::Mistral,
            Self::Qwen2(_) => Architecture::Qwen2,
        }
    }
}

/// Load tokenizer, generation settings and weights from a model directory and
/// bind them into a ready-to-use [`TextGenerator`].
pub fn load_generator(
    model_dir: &Path,
    device: &Device,
    dtype: DType,
    seed: Option<u64>,
) -> CoreResult<TextGenerator> {
    let config_json = std::fs::read_to_string(model_dir.join(CONFIG_FILE))?;
    let hf_config: HfConfig = serde_json::from_str(&config_json)?;
    let architecture = Architecture::detect(&hf_config)?;

    let tokenizer = Arc::new(Tokenizer::from_file(&model_dir.join(TOKENIZER_FILE))?);
    let generation = GenerationConfig::from_model_dir(model_dir)?;
    let model = AnyModel::load(model_dir, &config_json, architecture, device, dtype)?;

    let mut stop_token_ids: Vec<u32> = hf_config
        .eos_token_id
        .as_ref()
        .map(|ids| ids.to_vec())
        .unwrap_or_default();
    stop_token_ids.extend(generation.eos_token_ids());
    stop_token_ids.extend(tokenizer.eos_token_id());
    stop_token_ids.sort_unstable();
    stop_token_ids.dedup();

    let sampling = generation.sampling_params(seed);
    info!(
        %architecture,
        ?stop_token_ids,
        temperature = sampling.temperature,
        top_k = ?sampling.top_k,
        top_p = ?sampling.top_p,
        "Model loaded"
    );

    Ok(TextGenerator::new(
        Box::new(model),
        tokenizer,
        device.clone(),
        sampling,
        stop_token_ids,
        hf_config.max_position_embeddings,
    ))
}

/// Safetensors files of a model directory: every shard named by the index
/// when the model is sharded, else the single `model.safetensors`.
pub fn weight_files(model_dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let index_path = model_dir.join(SAFETENSORS_INDEX);
    if index_path.exists() {
        let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&index_path)?)?;
        let weight_map = index["weight_map"].as_object().ok_or_else(|| CoreError::Config {
            field: SAFETENSORS_INDEX.to_string(),
            reason: "missing weight_map".to_string(),
        })?;
        let shards: BTreeSet<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
        return Ok(shards.into_iter().map(|s| model_dir.join(s)).collect());
    }

    let single = model_dir.join(SAFETENSORS_SINGLE);
    if single.exists() {
        return Ok(vec![single]);
    }

    Err(CoreError::Config {
        field: "model_dir".to_string(),
        reason: format!("no safetensors weights found in {}", model_dir.display()),
    })
}
