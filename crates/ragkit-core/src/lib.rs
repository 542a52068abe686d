//! # ragkit-core
//!
//! Causal language model loading and sampled text generation for ragkit.
//!
//! [`LlmEngine`] resolves a model by name through `ragkit-hub`, picks a device
//! and precision, and exposes [`LlmEngine::generate`], which returns the prompt
//! followed by its continuation.
//!
//! ## Supported Architectures
//!
//! | `model_type` | Backend |
//! |--------------|---------|
//! | `llama` | [`llama::LlamaModel`] (candle `llama`) |
//! | `mistral` | candle `mistral` |
//! | `qwen2` | candle `qwen2` |
//!
//! Weights must be safetensors, either a single `model.safetensors` or shards
//! listed in `model.safetensors.index.json`.
//!
//! ## Feature Flags
//!
//! | Flag | Effect |
//! |---|---|
//! | `cuda` | Enable CUDA GPU acceleration |
//! | `metal` | Enable Apple Metal GPU acceleration |

pub mod device;
pub mod engine;
pub mod error;
pub mod generation;
pub mod llama;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod tokenizer;

pub use device::{select_device, select_dtype, DevicePreference};
pub use engine::{EngineConfig, LlmEngine, DEFAULT_MAX_NEW_TOKENS};
pub use error::{CoreError, CoreResult};
pub use generation::{GenerationConfig, SamplingParams};
pub use loader::AnyModel;
pub use model::{Architecture, Model};
pub use pipeline::TextGenerator;
pub use tokenizer::Tokenizer;
