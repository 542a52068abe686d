//! Sampling settings for the text-generation pipeline.
//!
//! Defaults follow the usual `transformers` pipeline behaviour with sampling
//! switched on: temperature 1.0, top-k 50, top-p 1.0, no repetition penalty.
//! A model's `generation_config.json` overrides any of these.

use std::path::Path;

use candle_transformers::generation::Sampling;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreResult;
use crate::model::TokenIds;

pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";

/// Resolved sampling parameters for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    /// `None` disables top-k filtering.
    pub top_k: Option<usize>,
    /// `None` disables nucleus filtering.
    pub top_p: Option<f64>,
    pub repetition_penalty: f32,
    /// How many trailing tokens the repetition penalty looks at.
    pub repeat_last_n: usize,
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: Some(50),
            top_p: None,
            repetition_penalty: 1.0,
            repeat_last_n: 64,
            seed: None,
        }
    }
}

impl SamplingParams {
    /// The candle sampling strategy for these parameters.
    ///
    /// A non-positive temperature degenerates to argmax.
    pub fn sampling(&self) -> Sampling {
        if self.temperature <= 0.0 {
            return Sampling::ArgMax;
        }
        let temperature = self.temperature;
        match (self.top_k, self.top_p) {
            (None, None) => Sampling::All { temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        }
    }
}

/// The sampling-related subset of `generation_config.json`.
///
/// Every field is optional; absent or `null` values keep the pipeline default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    pub temperature: Option<f64>,
    pub top_k: Option<usize>,
    pub top_p: Option<f64>,
    pub repetition_penalty: Option<f32>,
    pub eos_token_id: Option<TokenIds>,
}

impl GenerationConfig {
    /// Read `generation_config.json` from `model_dir`; a missing file yields
    /// the defaults.
    pub fn from_model_dir(model_dir: &Path) -> CoreResult<Self> {
        let path = model_dir.join(GENERATION_CONFIG_FILE);
        if !path.exists() {
            debug!(model_dir = %model_dir.display(), "No generation_config.json, using defaults");
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    pub fn sampling_params(&self, seed: Option<u64>) -> SamplingParams {
        let defaults = SamplingParams::default();
        SamplingParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_k: match self.top_k {
                Some(0) => None,
                Some(k) => Some(k),
                None => defaults.top_k,
            },
            top_p: self.top_p.filter(|p| *p < 1.0).or(defaults.top_p),
            repetition_penalty: self.repetition_penalty.unwrap_or(defaults.repetition_penalty),
            seed,
            ..defaults
        }
    }

    pub fn eos_token_ids(&self) -> Vec<u32> {
        self.eos_token_id.as_ref().map(TokenIds::to_vec).unwrap_or_default()
    }
}
