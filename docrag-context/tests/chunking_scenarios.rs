//! End-to-end chunking scenarios through the public API.

use docrag_context::tokenizer::{CharTokenizerSource, Tokenizer, TokenizerSource};
use docrag_context::{ChunkError, ChunkingConfig, TokenChunker};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts live tokenizer instances so tests can check they are released.
struct CountingSource {
    live: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
    fail_decode: bool,
}

struct CountingTokenizer {
    live: Arc<AtomicUsize>,
    fail_decode: bool,
}

impl Drop for CountingTokenizer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Tokenizer for CountingTokenizer {
    fn encode(&self, text: &str) -> docrag_context::Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> docrag_context::Result<String> {
        if self.fail_decode {
            return Err(ChunkError::Decode {
                start: 0,
                end: tokens.len(),
                message: "forced failure".to_string(),
            });
        }
        Ok(tokens.iter().filter_map(|&t| char::from_u32(t)).collect())
    }
}

impl TokenizerSource for CountingSource {
    fn acquire(&self) -> docrag_context::Result<Box<dyn Tokenizer>> {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingTokenizer {
            live: Arc::clone(&self.live),
            fail_decode: self.fail_decode,
        }))
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

fn counting_chunker(fail_decode: bool) -> (TokenChunker, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let live = Arc::new(AtomicUsize::new(0));
    let acquired = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        live: Arc::clone(&live),
        acquired: Arc::clone(&acquired),
        fail_decode,
    };
    let chunker = TokenChunker::new(Arc::new(source), ChunkingConfig::new(5, 2)).unwrap();
    (chunker, live, acquired)
}

#[test]
fn test_tokenizer_released_after_split() {
    let (chunker, live, acquired) = counting_chunker(false);

    chunker.split("abcdefghijkl").unwrap();
    chunker.split("mnop").unwrap();

    assert_eq!(acquired.load(Ordering::SeqCst), 2, "one instance per split");
    assert_eq!(live.load(Ordering::SeqCst), 0, "all instances released");
}

#[test]
fn test_tokenizer_released_on_error() {
    let (chunker, live, _) = counting_chunker(true);

    let err = chunker.split("abcdefghijkl").unwrap_err();
    assert!(matches!(err, ChunkError::Decode { start: 0, end: 5, .. }));
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_splits_use_independent_instances() {
    let (chunker, live, acquired) = counting_chunker(false);
    let text = "the quick brown fox jumps over the lazy dog".repeat(20);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let chunker = chunker.clone();
            let text = text.as_str();
            scope.spawn(move || {
                let chunks = chunker.split(text).unwrap();
                assert!(chunks.len() > 1);
            });
        }
    });

    assert_eq!(acquired.load(Ordering::SeqCst), 4);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_multibyte_text_keeps_offsets() {
    let chunker =
        TokenChunker::new(Arc::new(CharTokenizerSource), ChunkingConfig::new(4, 1)).unwrap();
    let chunks = chunker.split("가나다라마바사").unwrap();

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["가나다라", "라마바사"]);
    assert_eq!(chunks[1].start_token, 3);
    assert_eq!(chunks[1].end_token, 7);
}
