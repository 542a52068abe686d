use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use tracing::debug;

use crate::{
    error::CoreResult,
    model::{Architecture, Model},
};

/// LLaMA-family model. Unlike the other families, candle keeps the LLaMA KV
/// cache outside the model, so it lives here alongside the weights.
pub struct LlamaModel {
    inner: Llama,
    cache: Cache,
    config: Config,
    device: Device,
    dtype: DType,
}

impl std::fmt::Debug for LlamaModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaModel")
            .field("dtype", &self.dtype)
            .field("num_hidden_layers", &self.config.num_hidden_layers)
            .finish()
    }
}

impl LlamaModel {
    pub fn load(config_json: &str, vb: VarBuilder, device: &Device, dtype: DType) -> CoreResult<Self> {
        let hf_config: LlamaConfig = serde_json::from_str(config_json)?;
        let config = hf_config.into_config(false);
        debug!(
            hidden_size = config.hidden_size,
            num_hidden_layers = config.num_hidden_layers,
            "Resolved LLaMA config"
        );
        let cache = Cache::new(true, dtype, &config, device)?;
        let inner = Llama::load(vb, &config)?;
        Ok(Self { inner, cache, config, device: device.clone(), dtype })
    }
}

impl Model for LlamaModel {
    fn forward(&mut self, input_ids: &Tensor, seqlen_offset: usize) -> CoreResult<Tensor> {
        Ok(self.inner.forward(input_ids, seqlen_offset, &mut self.cache)?)
    }

    fn clear_cache(&mut self) -> CoreResult<()> {
        self.cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        Ok(())
    }

    fn architecture(&self) -> Architecture {
        Architecture::Llama
    }
}
