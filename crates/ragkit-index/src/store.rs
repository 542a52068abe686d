use std::path::{Path, PathBuf};

use candle_core::Tensor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    device::index_device,
    error::{IndexError, IndexResult},
    flat::{tmp_path_for, with_suffix, FlatIpIndex},
};

// ─── Configuration ────────────────────────────────────────────────────────────

pub const DEFAULT_DIM: usize = 384;
pub const DEFAULT_TOP_K: usize = 5;
const META_SUFFIX: &str = ".meta";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Width of every stored vector.
    pub dim: usize,
    /// Index file; the identifier map lives next to it at `<path>.meta`.
    pub path: PathBuf,
    pub use_gpu: bool,
    pub cuda_device_id: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            path: PathBuf::from("data/vector_index.safetensors"),
            use_gpu: false,
            cuda_device_id: 0,
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit<I = String> {
    pub id: I,
    pub score: f32,
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// A [`FlatIpIndex`] paired with the caller's identifiers, position for
/// position, and persisted as two files.
///
/// ```rust,no_run
/// use candle_core::{Device, Tensor};
/// use ragkit_index::{IndexConfig, VectorStore};
///
/// # fn run() -> ragkit_index::IndexResult<()> {
/// let mut store = VectorStore::new(IndexConfig { dim: 3, ..Default::default() });
/// let vectors = Tensor::new(&[[1f32, 0., 0.], [0., 1., 0.]], &Device::Cpu)?;
/// store.build_index(&vectors, vec!["a".to_string(), "b".to_string()])?;
/// store.save_index()?;
///
/// let query = Tensor::new(&[1f32, 0.1, 0.], &Device::Cpu)?;
/// for hit in &store.search(&query, 1)?[0] {
///     println!("{}\t{}", hit.id, hit.score);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct VectorStore<I = String> {
    config: IndexConfig,
    index: Option<FlatIpIndex>,
    ids: Vec<I>,
}

impl<I> VectorStore<I>
where
    I: Clone + Serialize + DeserializeOwned,
{
    pub fn new(config: IndexConfig) -> Self {
        Self { config, index: None, ids: Vec::new() }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Whether an index is held (built or loaded).
    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    pub fn len(&self) -> usize {
        self.index.as_ref().map_or(0, FlatIpIndex::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> &[I] {
        &self.ids
    }

    /// `<path>.meta`
    pub fn meta_path(&self) -> PathBuf {
        with_suffix(&self.config.path, META_SUFFIX)
    }

    // ─── Build and persist ────────────────────────────────────────────────────

    /// Replace any held index with one built from `vectors` (shape
    /// `(n, dim)`), where row `i` is identified by `ids[i]`.
    pub fn build_index(&mut self, vectors: &Tensor, ids: Vec<I>) -> IndexResult<()> {
        let dim = self.config.dim;
        let rows = match vectors.dims() {
            [rows, width] if *width == dim => *rows,
            shape => return Err(IndexError::DimensionMismatch { expected: dim, shape: shape.to_vec() }),
        };
        if ids.len() != rows {
            return Err(IndexError::IdCountMismatch { vectors: rows, ids: ids.len() });
        }

        let device = index_device(self.config.use_gpu, self.config.cuda_device_id);
        let mut index = FlatIpIndex::new(dim, device)?;
        index.add(vectors)?;
        info!(vectors = rows, dim, "Index built");

        self.index = Some(index);
        self.ids = ids;
        Ok(())
    }

    /// Write the index to `path` and the identifiers to `<path>.meta`.
    pub fn save_index(&self) -> IndexResult<()> {
        let index = self.index.as_ref().ok_or(IndexError::NotBuilt)?;
        let path = &self.config.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let meta_path = self.meta_path();
        let index_tmp = tmp_path_for(path);
        let meta_tmp = tmp_path_for(&meta_path);
        let committed = self.stage(index, &index_tmp, &meta_tmp).and_then(|()| {
            // meta first, index last
            std::fs::rename(&meta_tmp, &meta_path)?;
            std::fs::rename(&index_tmp, path)?;
            Ok(())
        });
        if let Err(e) = committed {
            std::fs::remove_file(&index_tmp).ok();
            std::fs::remove_file(&meta_tmp).ok();
            return Err(e);
        }

        info!(
            path = %path.display(),
            meta = %meta_path.display(),
            vectors = index.len(),
            "Index saved"
        );
        Ok(())
    }

    /// Write both artifacts to their temp paths.
    fn stage(&self, index: &FlatIpIndex, index_tmp: &Path, meta_tmp: &Path) -> IndexResult<()> {
        index.save(index_tmp)?;
        std::fs::write(meta_tmp, serde_json::to_vec(&self.ids)?)?;
        Ok(())
    }

    /// Replace the held state with the index and identifiers stored at
    /// `path`. On any failure the held state is left as it was.
    pub fn load_index(&mut self) -> IndexResult<()> {
        let path = self.config.path.clone();
        let meta_path = self.meta_path();
        for required in [&path, &meta_path] {
            if !required.exists() {
                return Err(IndexError::NotFound { path: required.clone() });
            }
        }

        let device = index_device(self.config.use_gpu, self.config.cuda_device_id);
        let index = FlatIpIndex::load(&path, device)?;
        if index.dim() != self.config.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dim,
                shape: vec![index.len(), index.dim()],
            });
        }

        let ids: Vec<I> = serde_json::from_slice(&std::fs::read(&meta_path)?)?;
        if ids.len() != index.len() {
            return Err(IndexError::MetaMismatch { vectors: index.len(), ids: ids.len() });
        }

        info!(path = %path.display(), vectors = index.len(), "Index loaded");
        self.index = Some(index);
        self.ids = ids;
        Ok(())
    }

    // ─── Search ───────────────────────────────────────────────────────────────

    /// Up to `top_k` hits per query row, best first.
    ///
    /// `query` is a single vector of shape `(dim)` or a batch of shape
    /// `(q, dim)`; the result always has one entry per query row.
    pub fn search(&self, query: &Tensor, top_k: usize) -> IndexResult<Vec<Vec<SearchHit<I>>>> {
        let index = self.index.as_ref().ok_or(IndexError::NotBuilt)?;
        let queries = match query.dims() {
            [width] if *width == self.config.dim => query.unsqueeze(0)?,
            [_, width] if *width == self.config.dim => query.clone(),
            shape => {
                return Err(IndexError::DimensionMismatch {
                    expected: self.config.dim,
                    shape: shape.to_vec(),
                })
            }
        };

        let hits = index
            .search(&queries, top_k)?
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter_map(|(position, score)| {
                        let id = self.ids.get(position)?;
                        Some(SearchHit { id: id.clone(), score })
                    })
                    .collect()
            })
            .collect::<Vec<Vec<_>>>();
        debug!(queries = hits.len(), top_k, "Search finished");
        Ok(hits)
    }

    /// Convenience wrapper for a single query given as a slice.
    pub fn search_one(&self, query: &[f32], top_k: usize) -> IndexResult<Vec<SearchHit<I>>> {
        let device = self.index.as_ref().ok_or(IndexError::NotBuilt)?.device().clone();
        let query = Tensor::from_slice(query, query.len(), &device)?;
        Ok(self.search(&query, top_k)?.into_iter().next().unwrap_or_default())
    }
}

impl<I> VectorStore<I> {
    /// Location of the index file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use std::env::temp_dir;

    fn config_in(name: &str, dim: usize) -> IndexConfig {
        let dir = temp_dir().join(format!("ragkit_store_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        IndexConfig { dim, path: dir.join("nested").join("index.safetensors"), ..Default::default() }
    }

    fn vectors() -> Tensor {
        Tensor::new(
            &[[0.9f32, 0.1, 0.0], [0.1, 0.9, 0.0], [0.0, 0.2, 0.8], [0.6, 0.6, 0.1]],
            &Device::Cpu,
        )
        .unwrap()
    }

    fn ids() -> Vec<String> {
        ["doc-a", "doc-b", "doc-c", "doc-d"].iter().map(|s| s.to_string()).collect()
    }

    fn built(name: &str) -> VectorStore {
        let mut store = VectorStore::new(config_in(name, 3));
        store.build_index(&vectors(), ids()).unwrap();
        store
    }

    fn cleanup(store: &VectorStore) {
        if let Some(dir) = store.path().parent().and_then(Path::parent) {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.dim, 384);
        assert_eq!(config.path, PathBuf::from("data/vector_index.safetensors"));
        assert!(!config.use_gpu);
        assert_eq!(config.cuda_device_id, 0);

        let store: VectorStore = VectorStore::new(config);
        assert_eq!(store.meta_path(), PathBuf::from("data/vector_index.safetensors.meta"));
        assert!(!store.is_ready());
        assert!(store.is_empty());
    }

    #[test]
    fn test_search_before_build_fails() {
        let store: VectorStore = VectorStore::new(config_in("unbuilt_search", 3));
        let query = Tensor::new(&[1f32, 0., 0.], &Device::Cpu).unwrap();
        assert!(matches!(store.search(&query, 5), Err(IndexError::NotBuilt)));
        assert!(matches!(store.search_one(&[1., 0., 0.], 5), Err(IndexError::NotBuilt)));
    }

    #[test]
    fn test_save_before_build_fails() {
        let store: VectorStore = VectorStore::new(config_in("unbuilt_save", 3));
        assert!(matches!(store.save_index(), Err(IndexError::NotBuilt)));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_build_with_wrong_width_fails() {
        let mut store: VectorStore = VectorStore::new(config_in("wrong_width", 5));
        match store.build_index(&vectors(), ids()) {
            Err(IndexError::DimensionMismatch { expected, shape }) => {
                assert_eq!(expected, 5);
                assert_eq!(shape, vec![4, 3]);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
        assert!(!store.is_ready());
    }

    #[test]
    fn test_build_with_rank_one_fails() {
        let mut store: VectorStore = VectorStore::new(config_in("rank_one", 3));
        let flat = Tensor::new(&[1f32, 0., 0.], &Device::Cpu).unwrap();
        assert!(matches!(
            store.build_index(&flat, vec!["x".to_string()]),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_build_with_wrong_id_count_fails() {
        let mut store: VectorStore = VectorStore::new(config_in("id_count", 3));
        assert!(matches!(
            store.build_index(&vectors(), vec!["only-one".to_string()]),
            Err(IndexError::IdCountMismatch { vectors: 4, ids: 1 })
        ));
    }

    #[test]
    fn test_build_then_search() {
        let store = built("build_search");
        assert!(store.is_ready());
        assert_eq!(store.len(), 4);
        assert_eq!(store.ids().len(), 4);

        let query = Tensor::new(&[1f32, 0., 0.], &Device::Cpu).unwrap();
        let hits = store.search(&query, 2).unwrap();
        assert_eq!(hits.len(), 1);
        let found: Vec<&str> = hits[0].iter().map(|h| h.id.as_str()).collect();
        assert_eq!(found, vec!["doc-a", "doc-d"]);
        assert!(hits[0][0].score >= hits[0][1].score);
    }

    #[test]
    fn test_rebuild_replaces_state() {
        let mut store = built("rebuild");
        let one = Tensor::new(&[[0f32, 0., 1.]], &Device::Cpu).unwrap();
        store.build_index(&one, vec!["solo".to_string()]).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.ids(), ["solo".to_string()]);
    }

    #[test]
    fn test_batch_search_respects_top_k() {
        let store = built("batch");
        let queries = Tensor::new(&[[1f32, 0., 0.], [0., 0., 1.], [0.3, 0.3, 0.3]], &Device::Cpu).unwrap();
        for k in [0, 1, 3, 10] {
            let hits = store.search(&queries, k).unwrap();
            assert_eq!(hits.len(), 3);
            for row in &hits {
                assert!(row.len() <= k);
                assert!(row.len() <= store.len());
                assert!(row.iter().all(|h| store.ids().contains(&h.id)));
                assert!(row.windows(2).all(|w| w[0].score >= w[1].score));
            }
        }
    }

    #[test]
    fn test_search_rejects_wrong_query_width() {
        let store = built("query_width");
        let query = Tensor::new(&[1f32, 0.], &Device::Cpu).unwrap();
        assert!(matches!(
            store.search(&query, 3),
            Err(IndexError::DimensionMismatch { expected: 3, .. })
        ));
    }

    #[test]
    fn test_positions_beyond_id_map_are_dropped() {
        let mut store = built("short_ids");
        store.ids.truncate(2);
        let query = Tensor::new(&[0f32, 0.2, 0.8], &Device::Cpu).unwrap();
        let hits = store.search(&query, 4).unwrap();
        assert_eq!(hits[0].len(), 2);
        assert!(hits[0].iter().all(|h| h.id == "doc-a" || h.id == "doc-b"));
    }

    #[test]
    fn test_save_load_roundtrip_gives_identical_results() {
        let store = built("roundtrip");
        store.save_index().unwrap();
        assert!(store.path().exists());
        assert!(store.meta_path().exists());

        let mut fresh: VectorStore = VectorStore::new(store.config().clone());
        fresh.load_index().unwrap();
        assert_eq!(fresh.ids(), store.ids());

        let queries = Tensor::new(&[[1f32, 0., 0.], [0.2, 0.7, 0.1]], &Device::Cpu).unwrap();
        assert_eq!(fresh.search(&queries, 3).unwrap(), store.search(&queries, 3).unwrap());
        cleanup(&store);
    }

    #[test]
    fn test_save_overwrites_previous_files() {
        let mut store = built("overwrite");
        store.save_index().unwrap();
        let one = Tensor::new(&[[0f32, 1., 0.]], &Device::Cpu).unwrap();
        store.build_index(&one, vec!["new".to_string()]).unwrap();
        store.save_index().unwrap();

        let mut fresh: VectorStore = VectorStore::new(store.config().clone());
        fresh.load_index().unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh.ids(), ["new".to_string()]);
        cleanup(&store);
    }

    #[test]
    fn test_failed_save_keeps_previous_pair_on_disk() {
        let mut store: VectorStore = VectorStore::new(config_in("failed_save", 2));
        let rows = Tensor::new(&[[1f32, 0.], [0., 1.]], &Device::Cpu).unwrap();
        store.build_index(&rows, vec!["old-x".to_string(), "old-y".to_string()]).unwrap();
        store.save_index().unwrap();

        let swapped = Tensor::new(&[[0f32, 1.], [1., 0.]], &Device::Cpu).unwrap();
        store.build_index(&swapped, vec!["new-y".to_string(), "new-x".to_string()]).unwrap();
        // A directory squatting on the meta temp path makes the staging write fail.
        let meta_tmp = tmp_path_for(&store.meta_path());
        std::fs::create_dir_all(&meta_tmp).unwrap();
        assert!(matches!(store.save_index(), Err(IndexError::Io(_))));
        assert!(!tmp_path_for(store.path()).exists());
        std::fs::remove_dir_all(&meta_tmp).unwrap();

        let mut fresh: VectorStore = VectorStore::new(store.config().clone());
        fresh.load_index().unwrap();
        assert_eq!(fresh.ids(), ["old-x".to_string(), "old-y".to_string()]);
        let hits = fresh.search_one(&[1., 0.], 1).unwrap();
        assert_eq!(hits, vec![SearchHit { id: "old-x".to_string(), score: 1.0 }]);
        cleanup(&store);
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let store = built("no_temp_files");
        store.save_index().unwrap();
        assert!(!tmp_path_for(store.path()).exists());
        assert!(!tmp_path_for(&store.meta_path()).exists());
        cleanup(&store);
    }

    #[test]
    fn test_load_missing_index_keeps_state() {
        let mut store = built("missing_index");
        let query = Tensor::new(&[1f32, 0., 0.], &Device::Cpu).unwrap();
        let before = store.search(&query, 4).unwrap();

        match store.load_index() {
            Err(IndexError::NotFound { path }) => assert_eq!(path, store.path()),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(store.is_ready());
        assert_eq!(store.search(&query, 4).unwrap(), before);
    }

    #[test]
    fn test_load_without_meta_fails() {
        let store = built("missing_meta");
        store.save_index().unwrap();
        std::fs::remove_file(store.meta_path()).unwrap();

        let mut fresh: VectorStore = VectorStore::new(store.config().clone());
        match fresh.load_index() {
            Err(IndexError::NotFound { path }) => assert_eq!(path, store.meta_path()),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(!fresh.is_ready());
        cleanup(&store);
    }

    #[test]
    fn test_load_with_other_dim_fails() {
        let store = built("other_dim");
        store.save_index().unwrap();

        let mut wider: VectorStore = VectorStore::new(IndexConfig { dim: 8, ..store.config().clone() });
        assert!(matches!(
            wider.load_index(),
            Err(IndexError::DimensionMismatch { expected: 8, .. })
        ));
        assert!(!wider.is_ready());
        cleanup(&store);
    }

    #[test]
    fn test_load_with_mismatched_meta_fails() {
        let store = built("meta_mismatch");
        store.save_index().unwrap();
        std::fs::write(store.meta_path(), r#"["only", "two"]"#).unwrap();

        let mut fresh: VectorStore = VectorStore::new(store.config().clone());
        assert!(matches!(
            fresh.load_index(),
            Err(IndexError::MetaMismatch { vectors: 4, ids: 2 })
        ));
        assert!(!fresh.is_ready());
        cleanup(&store);
    }

    #[test]
    fn test_integer_identifiers() {
        let mut config = config_in("integer_ids", 3);
        config.path = config.path.with_file_name("ints.safetensors");
        let mut store: VectorStore<u64> = VectorStore::new(config.clone());
        store.build_index(&vectors(), vec![10, 20, 30, 40]).unwrap();
        store.save_index().unwrap();

        let mut fresh: VectorStore<u64> = VectorStore::new(config);
        fresh.load_index().unwrap();
        let hits = fresh.search_one(&[0., 0., 1.], 1).unwrap();
        assert_eq!(hits, vec![SearchHit { id: 30, score: hits[0].score }]);
        std::fs::remove_dir_all(store.path().parent().and_then(Path::parent).unwrap()).ok();
    }

    #[test]
    fn test_gpu_request_falls_back_when_unavailable() {
        let mut config = config_in("gpu_fallback", 3);
        config.use_gpu = true;
        let mut store: VectorStore = VectorStore::new(config);
        store.build_index(&vectors(), ids()).unwrap();
        assert_eq!(store.search_one(&[1., 0., 0.], 1).unwrap()[0].id, "doc-a");
    }
}
