use std::fmt;

use candle_core::Tensor;
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// A causal language model that can be driven one forward pass at a time.
///
/// Implementations own their KV cache; [`Model::clear_cache`] must be called
/// before starting an unrelated sequence.
pub trait Model: Send {
    /// Run `input_ids` (shape `(1, seq_len)`) starting at position
    /// `seqlen_offset` and return the logits of the last position.
    fn forward(&mut self, input_ids: &Tensor, seqlen_offset: usize) -> CoreResult<Tensor>;

    fn clear_cache(&mut self) -> CoreResult<()>;

    fn architecture(&self) -> Architecture;
}

/// Model families the loader knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Llama,
    Mistral,
    Qwen2,
}

impl Architecture {
    /// Pick the architecture from `model_type`, falling back to the first
    /// entry of `architectures` (e.g. `"Qwen2ForCausalLM"`).
    pub fn detect(config: &HfConfig) -> CoreResult<Self> {
        if let Some(arch) = config.model_type.as_deref().and_then(Self::from_model_type) {
            return Ok(arch);
        }
        let class = config
            .architectures
            .as_ref()
            .and_then(|a| a.first())
            .map(String::as_str);
        if let Some(arch) = class.and_then(Self::from_class_name) {
            return Ok(arch);
        }
        Err(CoreError::UnsupportedArchitecture(
            config
                .model_type
                .clone()
                .or_else(|| class.map(String::from))
                .unwrap_or_else(|| "<unspecified>".to_string()),
        ))
    }

    fn from_model_type(model_type: &str) -> Option<Self> {
        match model_type {
            "llama" => Some(Self::Llama),
            "mistral" => Some(Self::Mistral),
            "qwen2" => Some(Self::Qwen2),
            _ => None,
        }
    }

    fn from_class_name(class: &str) -> Option<Self> {
        match class {
            "LlamaForCausalLM" => Some(Self::Llama),
            "MistralForCausalLM" => Some(Self::Mistral),
            "Qwen2ForCausalLM" => Some(Self::Qwen2),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Llama => "llama",
            Self::Mistral => "mistral",
            Self::Qwen2 => "qwen2",
        })
    }
}

/// `eos_token_id` appears as either a single id or a list in HF configs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TokenIds {
    Single(u32),
    Many(Vec<u32>),
}

impl TokenIds {
    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Many(ids) => ids.clone(),
        }
    }
}

/// The architecture-independent subset of a HuggingFace `config.json`.
///
/// Architecture-specific fields are parsed separately by the candle config of
/// the detected family.
#[derive(Debug, Clone, Deserialize)]
pub struct HfConfig {
    pub model_type: Option<String>,
    pub architectures: Option<Vec<String>>,
    pub max_position_embeddings: Option<usize>,
    pub eos_token_id: Option<TokenIds>,
}
