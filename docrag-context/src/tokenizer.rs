//! Tokenizer adapter used by the chunker.
//!
//! Token offsets are only meaningful when the same model encodes and decodes,
//! so a [`TokenizerSource`] is bound to exactly one model for its lifetime.
//! Every call to [`TokenizerSource::acquire`] returns an independent
//! [`Tokenizer`] instance; the chunker holds it for the duration of a single
//! split and drops it afterwards, on success and on error alike.
//!
//! Two sources are provided:
//!
//! - [`HfTokenizerSource`]: a HuggingFace `tokenizer.json`, loaded from disk or
//!   from the hub. The default model is [`DEFAULT_TOKENIZER_MODEL`], the
//!   cl100k encoding used by GPT-4.
//! - [`CharTokenizerSource`]: one token per Unicode scalar value. Needs no
//!   model files, which makes it the tokenizer of choice for tests.
//!
//! ```
//! use docrag_context::tokenizer::{CharTokenizerSource, TokenizerSource};
//!
//! let source = CharTokenizerSource;
//! let tokenizer = source.acquire().unwrap();
//! let ids = tokenizer.encode("héllo").unwrap();
//! assert_eq!(ids.len(), 5);
//! assert_eq!(tokenizer.decode(&ids).unwrap(), "héllo");
//! ```

use crate::error::{ChunkError, Result};
use std::path::Path;

/// Hub identifier of the default tokenizer (cl100k, as used by GPT-4).
pub const DEFAULT_TOKENIZER_MODEL: &str = "Xenova/gpt-4";

/// Name reported by [`CharTokenizerSource`] and accepted by [`source_from_spec`].
pub const CHAR_TOKENIZER_MODEL: &str = "chars";

/// Encodes text into token ids and decodes token ids back into text.
pub trait Tokenizer {
    /// Encode `text` without adding special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode a token sequence. Windows cut from a longer sequence may decode
    /// with artifacts at multi-byte character boundaries.
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

/// Hands out tokenizer instances bound to a single fixed model.
pub trait TokenizerSource: Send + Sync {
    /// Acquire a tokenizer instance owned by the caller.
    fn acquire(&self) -> Result<Box<dyn Tokenizer>>;

    /// Identifier of the model behind this source
    fn model_name(&self) -> &str;
}

/// HuggingFace `tokenizers` backed source.
///
/// The model is parsed once; [`acquire`](TokenizerSource::acquire) clones the
/// parsed prototype so concurrent splits never share mutable tokenizer state.
pub struct HfTokenizerSource {
    model: String,
    prototype: tokenizers::Tokenizer,
}

impl std::fmt::Debug for HfTokenizerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizerSource")
            .field("model", &self.model)
            .finish()
    }
}

impl HfTokenizerSource {
    /// Load a tokenizer from a local `tokenizer.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let model = path.display().to_string();
        let tokenizer = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| ChunkError::tokenizer_load(model.clone(), e))?;
        Ok(Self::from_tokenizer(model, tokenizer))
    }

    /// Load a tokenizer from the HuggingFace hub (cached locally after the first fetch).
    pub fn from_pretrained(identifier: &str) -> Result<Self> {
        tracing::info!("Loading tokenizer from hub: {}", identifier);
        let tokenizer = tokenizers::Tokenizer::from_pretrained(identifier, None)
            .map_err(|e| ChunkError::tokenizer_load(identifier, e))?;
        Ok(Self::from_tokenizer(identifier.to_string(), tokenizer))
    }

    /// Wrap an already constructed tokenizer.
    pub fn from_tokenizer(model: String, mut tokenizer: tokenizers::Tokenizer) -> Self {
        // Offsets must cover the whole input, never a truncated or padded view of it
        tokenizer.with_padding(None);
        tokenizer.with_truncation(None).ok();
        Self {
            model,
            prototype: tokenizer,
        }
    }
}

impl TokenizerSource for HfTokenizerSource {
    fn acquire(&self) -> Result<Box<dyn Tokenizer>> {
        Ok(Box::new(HfTokenizer {
            inner: self.prototype.clone(),
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|source| ChunkError::Encode { source })?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner
            .decode(tokens, false)
            .map_err(|e| ChunkError::Decode {
                start: 0,
                end: tokens.len(),
                message: e.to_string(),
            })
    }
}

/// Model-free tokenizer: every Unicode scalar value is one token.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizerSource;

impl TokenizerSource for CharTokenizerSource {
    fn acquire(&self) -> Result<Box<dyn Tokenizer>> {
        Ok(Box::new(CharTokenizer))
    }

    fn model_name(&self) -> &str {
        CHAR_TOKENIZER_MODEL
    }
}

struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                char::from_u32(id).ok_or_else(|| ChunkError::Decode {
                    start: i,
                    end: i + 1,
                    message: format!("{id} is not a Unicode scalar value"),
                })
            })
            .collect()
    }
}

/// Build a tokenizer source from a user supplied spec.
///
/// `chars` selects [`CharTokenizerSource`], an existing file path is read as a
/// `tokenizer.json`, anything else is treated as a hub identifier.
pub fn source_from_spec(spec: &str) -> Result<std::sync::Arc<dyn TokenizerSource>> {
    if spec == CHAR_TOKENIZER_MODEL {
        return Ok(std::sync::Arc::new(CharTokenizerSource));
    }
    let path = Path::new(spec);
    if path.is_file() {
        return Ok(std::sync::Arc::new(HfTokenizerSource::from_file(path)?));
    }
    Ok(std::sync::Arc::new(HfTokenizerSource::from_pretrained(spec)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_tokenizer_round_trip() {
        let tokenizer = CharTokenizerSource.acquire().unwrap();
        let text = "한글 문서와 English text";
        let ids = tokenizer.encode(text).unwrap();
        assert_eq!(ids.len(), text.chars().count());
        assert_eq!(tokenizer.decode(&ids).unwrap(), text);
    }

    #[test]
    fn test_char_tokenizer_rejects_surrogates() {
        let tokenizer = CharTokenizerSource.acquire().unwrap();
        let err = tokenizer.decode(&[104, 0xD800]).unwrap_err();
        assert!(matches!(err, ChunkError::Decode { start: 1, end: 2, .. }));
    }

    #[test]
    fn test_source_from_spec_chars() {
        let source = source_from_spec("chars").unwrap();
        assert_eq!(source.model_name(), CHAR_TOKENIZER_MODEL);
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let err = HfTokenizerSource::from_file("/nonexistent/tokenizer.json").unwrap_err();
        assert!(matches!(err, ChunkError::TokenizerLoad { .. }));
        assert!(err.to_string().contains("/nonexistent/tokenizer.json"));
    }

    #[test]
    fn test_malformed_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "{\"model\": 42}").unwrap();

        // An existing file is read as tokenizer.json rather than looked up on the hub
        let result = source_from_spec(path.to_str().unwrap());
        assert!(matches!(result, Err(ChunkError::TokenizerLoad { .. })));
    }

    #[test]
    #[ignore] // Downloads the cl100k tokenizer from the hub - run with: cargo test -p docrag-context -- --ignored
    fn test_gpt4_tokenizer_round_trip() {
        let source = HfTokenizerSource::from_pretrained(DEFAULT_TOKENIZER_MODEL).unwrap();
        let tokenizer = source.acquire().unwrap();
        let text = "Chunking keeps token offsets stable.";
        let ids = tokenizer.encode(text).unwrap();
        assert!(!ids.is_empty());
        assert_eq!(tokenizer.decode(&ids).unwrap(), text);
    }
}
