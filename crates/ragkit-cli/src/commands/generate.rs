use std::time::Instant;

use tracing::info;

use ragkit_core::{DevicePreference, EngineConfig, LlmEngine};

use crate::config::AppConfig;

/// Per-invocation overrides of the `[llm]` config section.
#[derive(Debug, Default)]
pub struct GenerateArgs {
    pub model: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub device: Option<DevicePreference>,
    pub seed: Option<u64>,
    pub stats: bool,
}

/// Load the model, continue the prompt and print prompt plus continuation.
pub async fn run(args: GenerateArgs, config: &AppConfig) -> anyhow::Result<()> {
    let engine_config = engine_config(&args, config);
    let max_new_tokens = args.max_tokens.unwrap_or(config.llm.max_new_tokens);
    let mut engine = LlmEngine::new(engine_config);

    let load_start = Instant::now();
    engine.load().await?;
    let load_elapsed = load_start.elapsed();

    let gen_start = Instant::now();
    let text = engine.generate(&args.prompt, max_new_tokens)?;
    let gen_elapsed = gen_start.elapsed();
    info!(max_new_tokens, elapsed_ms = gen_elapsed.as_millis() as u64, "Generation complete");

    println!("{text}");
    if args.stats {
        eprintln!(
            "[stats] load {:.2} s | generate {:.2} s",
            load_elapsed.as_secs_f64(),
            gen_elapsed.as_secs_f64()
        );
    }
    Ok(())
}

fn engine_config(args: &GenerateArgs, config: &AppConfig) -> EngineConfig {
    let mut engine_config = EngineConfig::new(args.model.clone().unwrap_or_else(|| config.llm.model.clone()));
    engine_config.revision = config.llm.revision.clone();
    engine_config.device = args.device.unwrap_or(config.llm.device);
    engine_config.cache_dir = Some(config.hub.cache_dir.clone());
    engine_config.seed = args.seed.or(config.llm.seed);
    engine_config
}
