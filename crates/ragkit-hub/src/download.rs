use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use hf_hub::{
    api::tokio::{Api, ApiBuilder, ApiRepo},
    Repo, RepoType,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::{
    cache::ModelCache,
    error::{HubError, HubResult},
};

/// Files every causal-LM load needs.
const REQUIRED_FILES: &[&str] = &["config.json", "tokenizer.json"];

/// Files that improve the load when present but may legitimately be missing.
const OPTIONAL_FILES: &[&str] = &[
    "generation_config.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
];

const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";
const SAFETENSORS_SINGLE: &str = "model.safetensors";

const PB_TEMPLATE_SIZED: &str =
    "{wide_msg}\n[{bar:50.cyan/blue}] {bytes}/{total_bytes}  {bytes_per_sec}  ETA {eta}";
const PB_TEMPLATE_SPINNER: &str =
    "{spinner:.green} {wide_msg}  {bytes}  {bytes_per_sec}  [{elapsed_precise}]";

// ─── Downloader ───────────────────────────────────────────────────────────────

/// Fetches model repositories from the Hugging Face Hub into a [`ModelCache`].
pub struct ModelDownloader {
    cache: ModelCache,
    api: Api,
    http: reqwest::Client,
    hf_token: Option<String>,
}

impl ModelDownloader {
    /// Reads `HUGGING_FACE_HUB_TOKEN` from the environment for gated repos.
    pub fn new(cache: ModelCache) -> HubResult<Self> {
        let hf_token = std::env::var("HUGGING_FACE_HUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let api = ApiBuilder::new().with_token(hf_token.clone()).build()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("ragkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HubError::DownloadFailed {
                file: "<http client>".into(),
                reason: e.to_string(),
            })?;

        Ok(Self { cache, api, http, hf_token })
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Download config, tokenizer and safetensors weights (single file or
    /// every shard named by the index) for `repo_id@revision`.
    ///
    /// Returns the local paths of every file that is now cached. Missing
    /// optional files are skipped with a warning; any other failure aborts.
    pub async fn pull(
        &self,
        repo_id: &str,
        revision: &str,
        mp: Option<&MultiProgress>,
    ) -> HubResult<Vec<PathBuf>> {
        info!(repo_id, revision, "Pulling model");
        let repo = self.api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let mut filenames: Vec<String> = REQUIRED_FILES.iter().map(|s| s.to_string()).collect();
        filenames.extend(self.weight_filenames(&repo, repo_id, revision, mp).await?);
        filenames.extend(OPTIONAL_FILES.iter().map(|s| s.to_string()));

        let mut local_paths = Vec::with_capacity(filenames.len());
        for filename in &filenames {
            match self.download_file(&repo, repo_id, revision, filename, mp).await {
                Ok(path) => local_paths.push(path),
                Err(e) if OPTIONAL_FILES.contains(&filename.as_str()) => {
                    warn!(filename, error = %e, "Optional file not available, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(local_paths)
    }

    // ─── Discovery ────────────────────────────────────────────────────────────

    /// Resolve which weight files the repo ships: the shards listed in
    /// `model.safetensors.index.json` when it exists, else `model.safetensors`.
    async fn weight_filenames(
        &self,
        repo: &ApiRepo,
        repo_id: &str,
        revision: &str,
        mp: Option<&MultiProgress>,
    ) -> HubResult<Vec<String>> {
        match self.download_file(repo, repo_id, revision, SAFETENSORS_INDEX, mp).await {
            Ok(index_path) => {
                let mut shards = shard_filenames(&index_path)?;
                info!(shards = shards.len(), "Model is sharded");
                shards.push(SAFETENSORS_INDEX.to_string());
                Ok(shards)
            }
            Err(e) => {
                debug!(error = %e, "No safetensors index, expecting a single weight file");
                Ok(vec![SAFETENSORS_SINGLE.to_string()])
            }
        }
    }

    // ─── Download engine ──────────────────────────────────────────────────────

    /// Stream one file to `<dest>.tmp`, rename it into place, then write its
    /// sidecar. Already-cached files are returned untouched.
    async fn download_file(
        &self,
        repo: &ApiRepo,
        repo_id: &str,
        revision: &str,
        filename: &str,
        mp: Option<&MultiProgress>,
    ) -> HubResult<PathBuf> {
        let dest = self.cache.file_path(repo_id, revision, filename);
        if self.cache.is_cached(repo_id, revision, filename) {
            debug!(filename, "Already cached, skipping download");
            return Ok(dest);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut req = self.http.get(repo.url(filename));
        if let Some(token) = &self.hf_token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await.map_err(|e| HubError::DownloadFailed {
            file: filename.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let hint = if matches!(status.as_u16(), 401 | 403) {
                " (hint: set HUGGING_FACE_HUB_TOKEN for gated repos)"
            } else {
                ""
            };
            return Err(HubError::DownloadFailed {
                file: filename.to_string(),
                reason: format!("HTTP {status}{hint}"),
            });
        }

        info!(filename, "Downloading");
        let pb = mp.map(|m| progress_bar(m, filename, response.content_length()));
        let tmp_path = tmp_path_for(&dest);
        if let Err(e) = stream_to_disk(response, &tmp_path, pb.as_ref()).await {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        std::fs::rename(&tmp_path, &dest)?;
        self.cache.record(repo_id, revision, filename)?;

        if let Some(pb) = pb {
            pb.finish_with_message(format!("Done  {filename}"));
        }
        Ok(dest)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn stream_to_disk(
    response: reqwest::Response,
    path: &Path,
    pb: Option<&ProgressBar>,
) -> HubResult<()> {
    let mut file = std::fs::File::create(path)?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HubError::DownloadFailed {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
        file.write_all(&chunk)?;
        if let Some(pb) = pb {
            pb.inc(chunk.len() as u64);
        }
    }
    file.flush()?;
    Ok(())
}

fn progress_bar(mp: &MultiProgress, filename: &str, content_length: Option<u64>) -> ProgressBar {
    let pb = match content_length {
        Some(total) => {
            let pb = mp.add(ProgressBar::new(total));
            if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE_SIZED) {
                pb.set_style(style.progress_chars("##-"));
            }
            pb
        }
        None => {
            let pb = mp.add(ProgressBar::new_spinner());
            if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE_SPINNER) {
                pb.set_style(style);
            }
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb
        }
    };
    pb.set_message(filename.to_string());
    pb
}

fn tmp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Unique, sorted shard filenames from a `model.safetensors.index.json`.
fn shard_filenames(index_path: &Path) -> HubResult<Vec<String>> {
    let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(index_path)?)?;
    let weight_map = index["weight_map"]
        .as_object()
        .ok_or_else(|| HubError::DownloadFailed {
            file: SAFETENSORS_INDEX.to_string(),
            reason: "index has no weight_map".to_string(),
        })?;
    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(String::from)
        .collect();
    Ok(shards.into_iter().collect())
}
