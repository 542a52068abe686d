//! # ragkit-index
//!
//! Exact inner-product similarity search over dense vectors.
//!
//! [`VectorStore`] pairs a [`FlatIpIndex`] with caller-supplied identifiers
//! and persists both next to each other:
//!
//! | File | Contents |
//! |------|----------|
//! | `<path>` | safetensors, one F32 tensor `vectors` of shape `(n, dim)` |
//! | `<path>.meta` | JSON array of identifiers, position `i` ↔ row `i` |
//!
//! Vectors are scored by raw inner product; normalise them first for cosine
//! similarity.
//!
//! ## Feature Flags
//!
//! | Flag | Effect |
//! |---|---|
//! | `cuda` | Allow `use_gpu` to place the index on a CUDA device |
//! | `metal` | Allow `use_gpu` to place the index on a Metal device |

pub mod device;
pub mod error;
pub mod flat;
pub mod store;

pub use error::{IndexError, IndexResult};
pub use flat::FlatIpIndex;
pub use store::{IndexConfig, SearchHit, VectorStore, DEFAULT_DIM, DEFAULT_TOP_K};
