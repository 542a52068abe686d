use std::path::{Path, PathBuf};

use candle_core::Device;
use ragkit_hub::{ModelCache, ModelDownloader};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    device::{device_name, select_device, select_dtype, DevicePreference},
    error::{CoreError, CoreResult},
    loader::load_generator,
    pipeline::TextGenerator,
};

/// Token budget used when callers have no preference.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;

/// What to load and where to run it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Registry id (`owner/repo`) or a local model directory.
    pub model_name: String,
    pub revision: String,
    pub device: DevicePreference,
    /// Root of the registry cache; `None` uses [`ModelCache::default_cache`].
    pub cache_dir: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl EngineConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            revision: "main".to_string(),
            device: DevicePreference::Auto,
            cache_dir: None,
            seed: None,
        }
    }
}

#[derive(Debug)]
struct LoadedModel {
    generator: TextGenerator,
    model_dir: PathBuf,
    device: Device,
}

/// Owns at most one loaded model and exposes text generation over it.
///
/// ```rust,no_run
/// use ragkit_core::{EngineConfig, LlmEngine, DEFAULT_MAX_NEW_TOKENS};
///
/// # async fn run() -> ragkit_core::CoreResult<()> {
/// let mut engine = LlmEngine::new(EngineConfig::new("Qwen/Qwen2.5-0.5B-Instruct"));
/// engine.load().await?;
/// let text = engine.generate("The capital of France is", DEFAULT_MAX_NEW_TOKENS)?;
/// println!("{text}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LlmEngine {
    config: EngineConfig,
    loaded: Option<LoadedModel>,
}

impl LlmEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, loaded: None }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Directory the current model was loaded from.
    pub fn model_dir(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.model_dir.as_path())
    }

    /// Fetch the configured model (unless `model_name` is a local directory)
    /// and load it onto the selected device.
    ///
    /// Any previously loaded model is released first, so a failed reload
    /// leaves the engine unloaded.
    pub async fn load(&mut self) -> CoreResult<()> {
        self.unload();

        let local = Path::new(&self.config.model_name);
        let model_dir = if local.is_dir() {
            info!(path = %local.display(), "Loading model from local directory");
            local.to_path_buf()
        } else {
            let cache = match &self.config.cache_dir {
                Some(dir) => ModelCache::new(dir)?,
                None => ModelCache::default_cache()?,
            };
            let downloader = ModelDownloader::new(cache)?;
            downloader
                .pull(&self.config.model_name, &self.config.revision, None)
                .await?;
            downloader
                .cache()
                .model_dir(&self.config.model_name, &self.config.revision)
        };

        self.load_from_dir(&model_dir)
    }

    /// Load a model from a directory already holding `config.json`,
    /// `tokenizer.json` and safetensors weights.
    pub fn load_from_dir(&mut self, model_dir: &Path) -> CoreResult<()> {
        self.unload();

        let device = select_device(self.config.device)?;
        let dtype = select_dtype(&device);
        info!(
            model = %self.config.model_name,
            device = device_name(&device),
            ?dtype,
            "Loading model"
        );

        let generator = load_generator(model_dir, &device, dtype, self.config.seed)?;
        self.loaded = Some(LoadedModel {
            generator,
            model_dir: model_dir.to_path_buf(),
            device,
        });
        Ok(())
    }

    /// Release the current model, if any.
    pub fn unload(&mut self) {
        if let Some(previous) = self.loaded.take() {
            info!(
                model_dir = %previous.model_dir.display(),
                device = device_name(&previous.device),
                "Releasing model"
            );
        }
    }

    /// Continue `prompt` by up to `max_new_tokens` sampled tokens.
    ///
    /// Returns the prompt followed by the generated text.
    pub fn generate(&mut self, prompt: &str, max_new_tokens: usize) -> CoreResult<String> {
        let loaded = self.loaded.as_mut().ok_or(CoreError::NotLoaded)?;
        loaded.generator.generate(prompt, max_new_tokens)
    }
}
