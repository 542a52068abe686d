use indicatif::MultiProgress;
use tracing::info;

use ragkit_hub::{ModelCache, ModelDownloader};

use crate::config::AppConfig;

/// Download a model from the Hugging Face Hub into the local cache.
///
/// Accepts `owner/repo` or the `hf.co/owner/repo` form.
pub async fn run(raw_model_id: &str, revision: &str, config: &AppConfig) -> anyhow::Result<()> {
    let repo_id = parse_model_id(raw_model_id);
    let cache = ModelCache::new(&config.hub.cache_dir)?;
    info!(repo_id, revision, cache_dir = %cache.root().display(), "Pulling model");

    let downloader = ModelDownloader::new(cache)?;
    let mp = MultiProgress::new();
    let paths = downloader.pull(repo_id, revision, Some(&mp)).await?;

    println!(
        "\nModel '{}' cached to {}",
        repo_id,
        downloader.cache().model_dir(repo_id, revision).display()
    );
    println!("{} file(s):", paths.len());
    for p in &paths {
        println!("  {}", p.display());
    }

    Ok(())
}

fn parse_model_id(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix("https://huggingface.co/")
        .or_else(|| raw.strip_prefix("hf.co/"))
        .unwrap_or(raw)
        .trim_end_matches('/')
}
