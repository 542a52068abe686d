use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use ragkit_core::{DevicePreference, DEFAULT_MAX_NEW_TOKENS};
use ragkit_index::IndexConfig;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "RAGKIT";

/// Runtime configuration loaded from TOML + env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Registry id or local model directory.
    pub model: String,
    pub revision: String,
    pub device: DevicePreference,
    pub max_new_tokens: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HubConfig {
    pub cache_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                model: "Qwen/Qwen2.5-0.5B-Instruct".to_string(),
                revision: "main".to_string(),
                device: DevicePreference::Auto,
                max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
                seed: None,
            },
            index: IndexConfig::default(),
            hub: HubConfig {
                cache_dir: PathBuf::from("~/.cache/ragkit"),
            },
        }
    }
}

/// Load configuration from:
/// 1. Built-in defaults
/// 2. `config/default.toml` (if present)
/// 3. A custom config file path (if provided)
/// 4. Environment variables such as `RAGKIT_LLM__MAX_NEW_TOKENS`
pub fn load_config(config_file: Option<&PathBuf>) -> Result<AppConfig, ConfigError> {
    build_config(config_file, env_source())
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn build_config(config_file: Option<&PathBuf>, env: Environment) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let mut builder = Config::builder()
        .set_default("llm.model", defaults.llm.model)?
        .set_default("llm.revision", defaults.llm.revision)?
        .set_default("llm.device", defaults.llm.device.to_string())?
        .set_default("llm.max_new_tokens", defaults.llm.max_new_tokens as i64)?
        .set_default("index.dim", defaults.index.dim as i64)?
        .set_default("index.path", defaults.index.path.to_string_lossy().into_owned())?
        .set_default("index.use_gpu", defaults.index.use_gpu)?
        .set_default("index.cuda_device_id", defaults.index.cuda_device_id as i64)?
        .set_default("hub.cache_dir", defaults.hub.cache_dir.to_string_lossy().into_owned())?
        .add_source(File::with_name("config/default").required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder.add_source(env).build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(config::Map::new()))
    }

    fn env_with(pairs: &[(&str, &str)]) -> Environment {
        let map = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        env_source().source(Some(map))
    }

    #[test]
    fn test_default_llm_values() {
        let cfg = build_config(None, no_env()).unwrap();
        assert_eq!(cfg.llm.revision, "main");
        assert_eq!(cfg.llm.device, DevicePreference::Auto);
        assert_eq!(cfg.llm.max_new_tokens, 256);
        assert!(cfg.llm.seed.is_none());
    }

    #[test]
    fn test_default_index_values() {
        let cfg = build_config(None, no_env()).unwrap();
        assert_eq!(cfg.index, IndexConfig::default());
    }

    #[test]
    fn test_default_cache_dir() {
        let cfg = build_config(None, no_env()).unwrap();
        assert!(cfg.hub.cache_dir.ends_with("ragkit"));
    }

    #[test]
    fn test_custom_config_file_overrides_defaults() {
        let dir = std::env::temp_dir().join("ragkit_cfg_test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("custom.toml");
        std::fs::write(
            &file,
            "[llm]\nmodel = \"mistralai/Mistral-7B-v0.1\"\ndevice = \"cpu\"\nseed = 7\n\n[index]\ndim = 768\n",
        )
        .unwrap();

        let cfg = build_config(Some(&file), no_env()).unwrap();
        assert_eq!(cfg.llm.model, "mistralai/Mistral-7B-v0.1");
        assert_eq!(cfg.llm.device, DevicePreference::Cpu);
        assert_eq!(cfg.llm.seed, Some(7));
        assert_eq!(cfg.index.dim, 768);
        assert_eq!(cfg.index.path, PathBuf::from("data/vector_index.safetensors"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_custom_file_is_an_error() {
        let missing = std::env::temp_dir().join("ragkit_cfg_missing/none.toml");
        assert!(build_config(Some(&missing), no_env()).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let env = env_with(&[
            ("RAGKIT_LLM__MAX_NEW_TOKENS", "64"),
            ("RAGKIT_INDEX__USE_GPU", "true"),
            ("RAGKIT_LLM__DEVICE", "cuda:1"),
        ]);
        let cfg = build_config(None, env).unwrap();
        assert_eq!(cfg.llm.max_new_tokens, 64);
        assert!(cfg.index.use_gpu);
        assert_eq!(cfg.llm.device, DevicePreference::Cuda(1));
    }

    #[test]
    fn test_invalid_device_is_rejected() {
        let env = env_with(&[("RAGKIT_LLM__DEVICE", "tpu")]);
        assert!(build_config(None, env).is_err());
    }
}
