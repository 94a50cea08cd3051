//! Token-window chunking with overlap.
//!
//! Text is encoded once, cut into windows of at most `chunk_size` tokens, and
//! each window is decoded back to text. Consecutive windows share exactly
//! `overlap` tokens. The walk stops as soon as a window reaches the end of the
//! sequence, so no trailing chunk is ever a subset of the one before it.
//!
//! ```text
//! N = 1200, chunk_size = 500, overlap = 50
//!
//! [0 ............ 500)
//!            [450 ............ 950)
//!                         [900 ....... 1200)
//! ```
//!
//! ```
//! use docrag_context::chunker::{ChunkingConfig, TokenChunker};
//! use docrag_context::tokenizer::CharTokenizerSource;
//! use std::sync::Arc;
//!
//! let chunker = TokenChunker::new(
//!     Arc::new(CharTokenizerSource),
//!     ChunkingConfig::new(4, 1),
//! ).unwrap();
//!
//! let chunks = chunker.split("abcdefghij").unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
//! ```

use crate::error::{ChunkError, Result};
use crate::tokenizer::{Tokenizer, TokenizerSource};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// Default window size in tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default number of tokens shared by consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Window size and overlap, both measured in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum number of tokens per chunk
    pub chunk_size: usize,
    /// Tokens repeated at the start of the next chunk
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Require `chunk_size >= 1` and `overlap < chunk_size`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkError::invalid_config("chunk_size must be at least 1"));
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkError::invalid_config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A decoded token window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Decoded text of the window
    pub text: String,
    /// First token of the window (inclusive)
    pub start_token: usize,
    /// One past the last token of the window
    pub end_token: usize,
}

impl Chunk {
    pub fn token_len(&self) -> usize {
        self.end_token - self.start_token
    }
}

/// Compute the token windows for a sequence of `n` tokens.
///
/// Returns no windows for `n == 0` and exactly one window when
/// `n <= chunk_size`. The caller must pass a validated configuration
/// (`overlap < chunk_size`), otherwise the walk could not advance.
pub fn token_windows(n: usize, chunk_size: usize, overlap: usize) -> Vec<Range<usize>> {
    debug_assert!(overlap < chunk_size);

    let mut windows = Vec::new();
    if n == 0 {
        return windows;
    }

    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(n);
        windows.push(start..end);

        start = end - overlap;
        // A tail no longer than the overlap is already covered by this window
        if start + overlap >= n {
            break;
        }
    }
    windows
}

/// Split `text` with an already acquired tokenizer.
pub fn split_with(
    tokenizer: &dyn Tokenizer,
    text: &str,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    config.validate()?;

    let tokens = tokenizer.encode(text)?;
    let windows = token_windows(tokens.len(), config.chunk_size, config.overlap);

    let mut chunks = Vec::with_capacity(windows.len());
    for window in windows {
        let text = tokenizer
            .decode(&tokens[window.clone()])
            .map_err(|e| match e {
                ChunkError::Decode { message, .. } => ChunkError::Decode {
                    start: window.start,
                    end: window.end,
                    message,
                },
                other => other,
            })?;
        chunks.push(Chunk {
            text,
            start_token: window.start,
            end_token: window.end,
        });
    }

    tracing::debug!(
        "Split {} tokens into {} chunks (size {}, overlap {})",
        tokens.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );
    Ok(chunks)
}

/// Chunker bound to one tokenizer model.
///
/// Cloning is cheap; clones share the tokenizer source but each
/// [`split`](Self::split) acquires its own tokenizer instance.
#[derive(Clone)]
pub struct TokenChunker {
    source: Arc<dyn TokenizerSource>,
    config: ChunkingConfig,
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("model", &self.source.model_name())
            .field("config", &self.config)
            .finish()
    }
}

impl TokenChunker {
    /// Create a chunker, rejecting invalid window parameters up front.
    pub fn new(source: Arc<dyn TokenizerSource>, config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { source, config })
    }

    /// Same tokenizer, different window parameters.
    pub fn with_config(&self, config: ChunkingConfig) -> Result<Self> {
        Self::new(Arc::clone(&self.source), config)
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.source.model_name()
    }

    /// Split text into overlapping token windows.
    pub fn split(&self, text: &str) -> Result<Vec<Chunk>> {
        let tokenizer = self.source.acquire()?;
        split_with(tokenizer.as_ref(), text, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::CharTokenizerSource;

    fn chunker(chunk_size: usize, overlap: usize) -> TokenChunker {
        TokenChunker::new(
            Arc::new(CharTokenizerSource),
            ChunkingConfig::new(chunk_size, overlap),
        )
        .unwrap()
    }

    fn spans(chunks: &[Chunk]) -> Vec<(usize, usize)> {
        chunks.iter().map(|c| (c.start_token, c.end_token)).collect()
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunker(500, 50).split("").unwrap().is_empty());
        assert!(token_windows(0, 500, 50).is_empty());
    }

    #[test]
    fn test_exact_chunk_size_is_single_chunk() {
        let text = "a".repeat(500);
        let chunks = chunker(500, 50).split(&text).unwrap();
        assert_eq!(spans(&chunks), vec![(0, 500)]);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunker(500, 50).split("short").unwrap();
        assert_eq!(spans(&chunks), vec![(0, 5)]);
    }

    #[test]
    fn test_1200_tokens_default_parameters() {
        let windows = token_windows(1200, 500, 50);
        assert_eq!(windows, vec![0..500, 450..950, 900..1200]);
    }

    #[test]
    fn test_tail_within_overlap_is_not_emitted() {
        // 550 tokens: second window [450, 550) reaches the end, nothing after it
        assert_eq!(token_windows(550, 500, 50), vec![0..500, 450..550]);
        // 501 tokens: the tail of one token still gets its own overlapping window
        assert_eq!(token_windows(501, 500, 50), vec![0..500, 450..501]);
    }

    #[test]
    fn test_zero_overlap() {
        assert_eq!(token_windows(10, 4, 0), vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn test_chunk_size_one() {
        assert_eq!(token_windows(3, 1, 0), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_window_properties_hold_across_parameters() {
        for n in 0..120usize {
            for c in 1..12usize {
                for o in 0..c {
                    let windows = token_windows(n, c, o);

                    if n == 0 {
                        assert!(windows.is_empty());
                        continue;
                    }

                    // Lower bound on the number of windows
                    let min_count = (n.saturating_sub(o)).div_ceil(c - o);
                    assert!(
                        windows.len() >= min_count,
                        "n={n} c={c} o={o}: {} < {min_count}",
                        windows.len()
                    );

                    // Every token is covered
                    let mut covered = vec![false; n];
                    for w in &windows {
                        assert!(w.start < w.end && w.end <= n);
                        assert!(w.end - w.start <= c);
                        for flag in &mut covered[w.clone()] {
                            *flag = true;
                        }
                    }
                    assert!(covered.iter().all(|&f| f), "n={n} c={c} o={o}");

                    // Exact overlap between consecutive windows, except possibly the last pair
                    for (i, pair) in windows.windows(2).enumerate() {
                        let shared = pair[0].end - pair[1].start;
                        if i + 2 < windows.len() {
                            assert_eq!(shared, o, "n={n} c={c} o={o}");
                        } else {
                            assert!(shared >= o, "n={n} c={c} o={o}");
                        }
                    }

                    assert_eq!(windows.last().map(|w| w.end), Some(n));
                }
            }
        }
    }

    #[test]
    fn test_chunk_text_matches_window() {
        let text: String = ('a'..='z').collect();
        let chunks = chunker(10, 3).split(&text).unwrap();
        for chunk in &chunks {
            let expected: String = text
                .chars()
                .skip(chunk.start_token)
                .take(chunk.token_len())
                .collect();
            assert_eq!(chunk.text, expected);
        }
        assert_eq!(spans(&chunks), vec![(0, 10), (7, 17), (14, 24), (21, 26)]);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(ChunkingConfig::new(0, 0).validate().is_err());
        assert!(ChunkingConfig::new(50, 50).validate().is_err());
        assert!(ChunkingConfig::new(50, 60).validate().is_err());
        assert!(ChunkingConfig::new(1, 0).validate().is_ok());

        let err = TokenChunker::new(Arc::new(CharTokenizerSource), ChunkingConfig::new(10, 10))
            .unwrap_err();
        assert!(matches!(err, ChunkError::InvalidConfig { .. }));
    }

    #[test]
    fn test_with_config_keeps_model() {
        let base = chunker(500, 50);
        let small = base.with_config(ChunkingConfig::new(3, 1)).unwrap();
        assert_eq!(small.model_name(), base.model_name());
        assert_eq!(small.split("abcde").unwrap().len(), 2);
    }
}
