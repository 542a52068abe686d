use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

const EOS_CANDIDATES: &[&str] = &["</s>", "<|endoftext|>", "<|end_of_text|>", "<|im_end|>", "<eos>"];

/// Thin wrapper around a Hugging Face `tokenizer.json` tokenizer.
#[derive(Debug)]
pub struct Tokenizer {
    inner: HfTokenizer,
    eos_token_id: Option<u32>,
}

impl Tokenizer {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let inner = HfTokenizer::from_file(path).map_err(|e| {
            CoreError::Tokenizer(format!("{}: {e}", path.display()))
        })?;
        Ok(Self::wrap(inner))
    }

    /// Parse an in-memory `tokenizer.json` document.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> CoreResult<Self> {
        let inner = HfTokenizer::from_bytes(bytes).map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(Self::wrap(inner))
    }

    fn wrap(inner: HfTokenizer) -> Self {
        let eos_token_id = special_token_id(&inner, EOS_CANDIDATES);
        debug!(
            eos_token_id,
            vocab_size = inner.get_vocab_size(true),
            "Tokenizer loaded"
        );
        Self { inner, eos_token_id }
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> CoreResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> CoreResult<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }
}

fn special_token_id(tokenizer: &HfTokenizer, candidates: &[&str]) -> Option<u32> {
    candidates.iter().find_map(|c| tokenizer.token_to_id(c))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Whitespace-split word-level vocabulary, small enough to reason about in
    /// generation tests.
    pub(crate) const WORD_LEVEL_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 3, "content": "</s>", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "WhitespaceSplit"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "hello": 1, "world": 2, "</s>": 3, "again": 4},
            "unk_token": "[UNK]"
        }
    }"#;

    pub(crate) fn word_level() -> Tokenizer {
        Tokenizer::from_bytes(WORD_LEVEL_JSON).unwrap()
    }

    #[test]
    fn test_detects_eos() {
        let tok = word_level();
        assert_eq!(tok.eos_token_id(), Some(3));
    }

    #[test]
    fn test_encode_decode() {
        let tok = word_level();
        let ids = tok.encode("hello world", true).unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(tok.decode(&ids, true).unwrap(), "hello world");
    }

    #[test]
    fn test_unknown_word_maps_to_unk() {
        let tok = word_level();
        assert_eq!(tok.encode("hello mars", false).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let tok = word_level();
        assert_eq!(tok.decode(&[1, 3], true).unwrap(), "hello");
    }


    #[test]
    fn test_malformed_json_is_tokenizer_error() {
        assert!(matches!(
            Tokenizer::from_bytes("{not json"),
            Err(CoreError::Tokenizer(_))
        ));
    }
}
