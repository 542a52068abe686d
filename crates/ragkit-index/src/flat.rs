use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use tracing::debug;

use crate::error::{IndexError, IndexResult};

/// Name of the tensor holding the index rows in the safetensors file.
pub const VECTORS_TENSOR: &str = "vectors";

/// Exact inner-product index: every row is scored against every query.
///
/// Rows are kept as one `(n, dim)` F32 tensor on the index device; positions
/// are insertion order.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dim: usize,
    device: Device,
    vectors: Tensor,
}

impl FlatIpIndex {
    pub fn new(dim: usize, device: Device) -> IndexResult<Self> {
        let vectors = Tensor::zeros((0, dim), DType::F32, &device)?;
        Ok(Self { dim, device, vectors })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Append the rows of `vectors` (shape `(n, dim)`, any float dtype).
    pub fn add(&mut self, vectors: &Tensor) -> IndexResult<()> {
        check_width(vectors, self.dim)?;
        let rows = vectors.to_dtype(DType::F32)?.to_device(&self.device)?;
        self.vectors = if self.is_empty() {
            rows
        } else {
            Tensor::cat(&[&self.vectors, &rows], 0)?
        };
        Ok(())
    }

    /// Score `queries` (shape `(q, dim)`) against every row and return, per
    /// query, up to `k` `(position, score)` pairs by descending score.
    pub fn search(&self, queries: &Tensor, k: usize) -> IndexResult<Vec<Vec<(usize, f32)>>> {
        check_width(queries, self.dim)?;
        let num_queries = queries.dims()[0];
        if self.is_empty() || k == 0 {
            return Ok(vec![Vec::new(); num_queries]);
        }

        let queries = queries.to_dtype(DType::F32)?.to_device(&self.device)?;
        let scores = queries.matmul(&self.vectors.t()?)?.to_vec2::<f32>()?;
        debug!(queries = num_queries, rows = self.len(), k, "Flat index search");
        Ok(scores.into_iter().map(|row| top_k(row, k)).collect())
    }

    /// Rows copied to host memory.
    pub fn to_host(&self) -> IndexResult<Tensor> {
        Ok(self.vectors.to_device(&Device::Cpu)?)
    }

    /// Write the rows to `path` as safetensors, from host memory.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let tensors = HashMap::from([(VECTORS_TENSOR.to_string(), self.to_host()?)]);
        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }

    /// Read a safetensors file written by [`FlatIpIndex::save`] onto `device`.
    pub fn load(path: &Path, device: Device) -> IndexResult<Self> {
        let mut tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
        let vectors = tensors.remove(VECTORS_TENSOR).ok_or_else(|| {
            IndexError::Format(format!("{} has no '{VECTORS_TENSOR}' tensor", path.display()))
        })?;
        if vectors.rank() != 2 {
            return Err(IndexError::Format(format!(
                "'{VECTORS_TENSOR}' must be rank 2, found shape {:?}",
                vectors.dims()
            )));
        }
        let dim = vectors.dims()[1];
        let vectors = vectors.to_dtype(DType::F32)?.to_device(&device)?;
        Ok(Self { dim, device, vectors })
    }
}

fn check_width(t: &Tensor, dim: usize) -> IndexResult<()> {
    match t.dims() {
        [_, width] if *width == dim => Ok(()),
        shape => Err(IndexError::DimensionMismatch { expected: dim, shape: shape.to_vec() }),
    }
}

/// Highest `k` scores of one row; equal scores keep the lower position first.
fn top_k(scores: Vec<f32>, k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

/// `<path>.tmp`
pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// `path` with `suffix` appended to its file name.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}
