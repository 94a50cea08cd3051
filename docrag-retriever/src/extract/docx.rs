use super::{ExtractedDocument, Extractor, file_title, parse_blocking, read_bytes};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Word documents via `docx-lite`. DOCX has no fixed pagination, so one page is reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxExtractor;

#[async_trait]
impl Extractor for DocxExtractor {
    fn extensions(&self) -> &[&str] {
        &["docx"]
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let bytes = read_bytes(path).await?;
        let text = parse_blocking(path, move || {
            docx_lite::extract_text_from_bytes(&bytes)
                .map_err(|e| format!("DOCX extraction failed: {e}"))
        })
        .await?;

        Ok(ExtractedDocument {
            text,
            page_count: 1,
            title: file_title(path),
        })
    }
}
