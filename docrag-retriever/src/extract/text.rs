use super::{ExtractedDocument, Extractor, file_title, read_bytes};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Plain text and Markdown, read as UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    fn extensions(&self) -> &[&str] {
        &["txt", "md"]
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let bytes = read_bytes(path).await?;
        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&*text).to_string();

        Ok(ExtractedDocument {
            text,
            page_count: 1,
            title: file_title(path),
        })
    }
}
