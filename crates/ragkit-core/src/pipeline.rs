use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::utils::apply_repeat_penalty;
use tracing::debug;

use crate::{
    error::{CoreError, CoreResult},
    generation::SamplingParams,
    model::Model,
    tokenizer::Tokenizer,
};

// ─── Generator ────────────────────────────────────────────────────────────────

/// A model bound to its tokenizer, device and sampling settings.
///
/// This is the generation callable `LlmEngine` holds once loaded.
pub struct TextGenerator {
    model: Box<dyn Model>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    sampling: SamplingParams,
    stop_token_ids: Vec<u32>,
    max_sequence_length: Option<usize>,
}

impl std::fmt::Debug for TextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextGenerator")
            .field("architecture", &self.model.architecture())
            .field("sampling", &self.sampling)
            .field("stop_token_ids", &self.stop_token_ids)
            .finish()
    }
}

impl TextGenerator {
    pub fn new(
        model: Box<dyn Model>,
        tokenizer: Arc<Tokenizer>,
        device: Device,
        sampling: SamplingParams,
        stop_token_ids: Vec<u32>,
        max_sequence_length: Option<usize>,
    ) -> Self {
        Self { model, tokenizer, device, sampling, stop_token_ids, max_sequence_length }
    }

    /// Sample up to `max_new_tokens` tokens after `prompt` and return the
    /// prompt followed by the decoded continuation.
    ///
    /// Generation stops early on any stop token; stop tokens are not part of
    /// the returned text.
    pub fn generate(&mut self, prompt: &str, max_new_tokens: usize) -> CoreResult<String> {
        let prompt_ids = self.tokenizer.encode(prompt, true)?;
        if prompt_ids.is_empty() {
            return Err(CoreError::InvalidPrompt("prompt encodes to zero tokens".to_string()));
        }

        let mut budget = max_new_tokens;
        if let Some(max) = self.max_sequence_length {
            if prompt_ids.len() > max {
                return Err(CoreError::SequenceTooLong { got: prompt_ids.len(), max });
            }
            budget = budget.min(max - prompt_ids.len());
        }

        let seed = self.sampling.seed.unwrap_or_else(clock_seed);
        let mut processor = LogitsProcessor::from_sampling(seed, self.sampling.sampling());
        self.model.clear_cache()?;

        let mut tokens = prompt_ids.clone();
        let mut step_input = prompt_ids.clone();
        let mut offset = 0;
        for _ in 0..budget {
            let input = Tensor::new(step_input.as_slice(), &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .forward(&input, offset)?
                .flatten_all()?
                .to_dtype(DType::F32)?;
            let logits = if (self.sampling.repetition_penalty - 1.0).abs() > f32::EPSILON {
                let start = tokens.len().saturating_sub(self.sampling.repeat_last_n);
                apply_repeat_penalty(&logits, self.sampling.repetition_penalty, &tokens[start..])?
            } else {
                logits
            };

            let next = processor.sample(&logits)?;
            offset += step_input.len();
            if self.stop_token_ids.contains(&next) {
                debug!(token = next, "Stop token sampled");
                break;
            }
            tokens.push(next);
            step_input = vec![next];
        }

        let generated = &tokens[prompt_ids.len()..];
        debug!(prompt_tokens = prompt_ids.len(), new_tokens = generated.len(), "Generation finished");
        Ok(format!("{prompt}{}", self.continuation_text(&prompt_ids, &tokens)?))
    }

    // ─── Decoding ─────────────────────────────────────────────────────────────

    /// Text the new tokens add to the prompt.
    ///
    /// Decoding the whole sequence and removing the decoded prompt keeps the
    /// word-boundary spacing that decoding the new tokens alone would lose.
    fn continuation_text(&self, prompt_ids: &[u32], all_ids: &[u32]) -> CoreResult<String> {
        if all_ids.len() == prompt_ids.len() {
            return Ok(String::new());
        }
        let full = self.tokenizer.decode(all_ids, true)?;
        let prefix = self.tokenizer.decode(prompt_ids, true)?;
        match full.strip_prefix(prefix.as_str()) {
            Some(rest) => Ok(rest.to_string()),
            None => self.tokenizer.decode(&all_ids[prompt_ids.len()..], true),
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(299_792_458)
}
