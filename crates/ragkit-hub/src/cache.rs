use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HubError, HubResult};
use crate::integrity::{sha256_file, verify_integrity};

/// Sidecar record written next to every downloaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub repo_id: String,
    pub revision: String,
    pub filename: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// On-disk model cache.
///
/// Layout: `<root>/<owner>__<repo>/<revision>/<filename>`, with a
/// `<filename>.meta.json` sidecar describing each completed download.
#[derive(Debug, Clone)]
pub struct ModelCache {
    root: PathBuf,
}

impl ModelCache {
    /// Open (and create) a cache rooted at `root`. A leading `~` is expanded.
    pub fn new(root: impl AsRef<Path>) -> HubResult<Self> {
        let root = expand_tilde(root.as_ref());
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// `~/.cache/ragkit`
    pub fn default_cache() -> HubResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| HubError::InvalidCacheDir("Cannot determine home directory".to_string()))?;
        Self::new(home.join(".cache").join("ragkit"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every file of `(repo_id, revision)`; this is what the
    /// model loader is pointed at.
    pub fn model_dir(&self, repo_id: &str, revision: &str) -> PathBuf {
        self.root.join(repo_slug(repo_id)).join(revision)
    }

    pub fn file_path(&self, repo_id: &str, revision: &str, filename: &str) -> PathBuf {
        self.model_dir(repo_id, revision).join(filename)
    }

    pub fn meta_path(&self, repo_id: &str, revision: &str, filename: &str) -> PathBuf {
        self.model_dir(repo_id, revision)
            .join(format!("{filename}.meta.json"))
    }

    /// A file counts as cached only once both the data and its sidecar exist;
    /// interrupted downloads never get a sidecar.
    pub fn is_cached(&self, repo_id: &str, revision: &str, filename: &str) -> bool {
        self.file_path(repo_id, revision, filename).exists()
            && self.meta_path(repo_id, revision, filename).exists()
    }

    /// Hash a freshly downloaded file and write its sidecar.
    pub fn record(&self, repo_id: &str, revision: &str, filename: &str) -> HubResult<CachedFile> {
        let path = self.file_path(repo_id, revision, filename);
        let entry = CachedFile {
            repo_id: repo_id.to_string(),
            revision: revision.to_string(),
            filename: filename.to_string(),
            sha256: sha256_file(&path)?,
            size_bytes: std::fs::metadata(&path)?.len(),
        };
        self.write_meta(&entry)?;
        Ok(entry)
    }

    pub fn write_meta(&self, entry: &CachedFile) -> HubResult<()> {
        let path = self.meta_path(&entry.repo_id, &entry.revision, &entry.filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(entry)?)?;
        debug!(path = %path.display(), "Wrote cache sidecar");
        Ok(())
    }

    pub fn read_meta(&self, repo_id: &str, revision: &str, filename: &str) -> HubResult<CachedFile> {
        let path = self.meta_path(repo_id, revision, filename);
        if !path.exists() {
            return Err(HubError::NotCached {
                repo_id: repo_id.to_string(),
                revision: revision.to_string(),
                filename: filename.to_string(),
            });
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(&path)?)?)
    }

    /// Re-hash a cached file and compare it with the digest in its sidecar.
    pub fn verify(&self, repo_id: &str, revision: &str, filename: &str) -> HubResult<()> {
        let entry = self.read_meta(repo_id, revision, filename)?;
        verify_integrity(&self.file_path(repo_id, revision, filename), &entry.sha256)
    }

    /// Every cached `(repo_id, revision)` pair, sorted.
    pub fn list_models(&self) -> HubResult<Vec<(String, String)>> {
        let mut models = Vec::new();
        for repo_entry in std::fs::read_dir(&self.root)? {
            let repo_entry = repo_entry?;
            if !repo_entry.path().is_dir() {
                continue;
            }
            let repo_id = repo_entry.file_name().to_string_lossy().replace("__", "/");
            for rev_entry in std::fs::read_dir(repo_entry.path())? {
                let rev_entry = rev_entry?;
                if rev_entry.path().is_dir() {
                    models.push((repo_id.clone(), rev_entry.file_name().to_string_lossy().into_owned()));
                } else {
                    warn!(path = %rev_entry.path().display(), "Ignoring stray file in cache");
                }
            }
        }
        models.sort();
        Ok(models)
    }
}

fn repo_slug(repo_id: &str) -> String {
    repo_id.replace('/', "__")
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
