//! # ragkit-hub
//!
//! Fetches causal language models by name from the Hugging Face Hub and keeps
//! them in a local cache that `ragkit-core` loads from.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ragkit_hub::{ModelCache, ModelDownloader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = ModelCache::default_cache()?;
//!     let downloader = ModelDownloader::new(cache.clone())?;
//!     downloader.pull("Qwen/Qwen2.5-0.5B-Instruct", "main", None).await?;
//!     println!("{}", cache.model_dir("Qwen/Qwen2.5-0.5B-Instruct", "main").display());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod download;
pub mod error;
pub mod integrity;

pub use cache::{CachedFile, ModelCache};
pub use download::ModelDownloader;
pub use error::{HubError, HubResult};
