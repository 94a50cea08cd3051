use super::{ExtractedDocument, Extractor, file_title, parse_blocking, read_bytes};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// PDF text via `pdf-extract`, one page at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

#[async_trait]
impl Extractor for PdfExtractor {
    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let bytes = read_bytes(path).await?;
        let pages = parse_blocking(path, move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|e| format!("PDF extraction failed: {e:?}"))
        })
        .await?;

        Ok(ExtractedDocument {
            text: pages.join("\n"),
            page_count: pages.len(),
            title: file_title(path),
        })
    }
}
