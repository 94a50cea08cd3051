//! Text extraction from document files.
//!
//! Each supported format has one [`Extractor`]. The [`ExtractorRegistry`]
//! picks the extractor by the file's extension, compared case-insensitively,
//! and normalizes every result to an [`ExtractedDocument`].
//!
//! | Extension        | Extractor                | Page count      |
//! |------------------|--------------------------|-----------------|
//! | `txt`, `md`      | [`TextExtractor`]        | 1               |
//! | `pdf`            | [`PdfExtractor`]         | PDF pages       |
//! | `docx`           | [`DocxExtractor`]        | 1               |
//! | `pptx`           | [`PptxExtractor`]        | slides          |
//! | `xlsx`, `xls`    | [`SpreadsheetExtractor`] | sheets          |
//! | `hwp`            | [`HwpExtractor`]         | 1               |
//!
//! The page count is only reported back to the caller; chunking never looks at it.

use crate::error::{Result, RetrieverError};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

mod docx;
mod hwp;
mod pdf;
mod pptx;
mod spreadsheet;
mod text;

pub use docx::DocxExtractor;
pub use hwp::{DEFAULT_HWP_COMMAND, HwpExtractor};
pub use pdf::PdfExtractor;
pub use pptx::PptxExtractor;
pub use spreadsheet::SpreadsheetExtractor;
pub use text::TextExtractor;

/// Normalized output of every extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedDocument {
    /// Extracted UTF-8 text, possibly empty
    pub text: String,
    /// Pages, slides or sheets, used for reporting only
    pub page_count: usize,
    pub title: String,
}

/// Extracts text from one family of file formats.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Lower-case extensions handled, without the leading dot
    fn extensions(&self) -> &[&str];

    /// Extract text. Failures are reported as [`RetrieverError::ExtractionFailure`].
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument>;
}

/// File name used as the title of documents without one of their own.
pub(crate) fn file_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read a whole file, reporting failures as extraction failures.
pub(crate) async fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| RetrieverError::extraction(path, e.to_string()))
}

/// Run CPU-bound parsing off the async runtime. Parser panics become extraction failures.
pub(crate) async fn parse_blocking<T, F>(path: &Path, parse: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, String> + Send + 'static,
{
    tokio::task::spawn_blocking(parse)
        .await
        .map_err(|e| RetrieverError::extraction(path, format!("parser crashed: {e}")))?
        .map_err(|message| RetrieverError::extraction(path, message))
}

/// Maps file extensions to extractors.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &self.supported_extensions())
            .finish()
    }
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extractor. HWP files are converted by `hwp_command`.
    pub fn with_defaults(hwp_command: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register(TextExtractor);
        registry.register(PdfExtractor);
        registry.register(DocxExtractor);
        registry.register(PptxExtractor);
        registry.register(SpreadsheetExtractor);
        registry.register(HwpExtractor::new(hwp_command));
        registry
    }

    /// Register an extractor for all of its extensions, replacing earlier registrations.
    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) {
        let extractor: Arc<dyn Extractor> = Arc::new(extractor);
        for ext in extractor.extensions() {
            self.extractors
                .insert(ext.to_ascii_lowercase(), Arc::clone(&extractor));
        }
    }

    /// Registered extensions with their leading dot, sorted.
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> =
            self.extractors.keys().map(|ext| format!(".{ext}")).collect();
        extensions.sort();
        extensions
    }

    /// Find the extractor for a path, or fail with [`RetrieverError::UnsupportedFormat`].
    pub fn extractor_for(&self, path: &Path) -> Result<Arc<dyn Extractor>> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        self.extractors
            .get(&extension)
            .cloned()
            .ok_or_else(|| RetrieverError::UnsupportedFormat {
                extension: format!(".{extension}"),
                supported: self.supported_extensions(),
            })
    }

    /// Extract a file with the extractor registered for its extension.
    pub async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let extractor = self.extractor_for(path)?;
        tracing::debug!("Extracting {}", path.display());
        let document = extractor.extract(path).await?;
        tracing::debug!(
            "Extracted {} characters over {} pages from {}",
            document.text.len(),
            document.page_count,
            path.display()
        );
        Ok(document)
    }
}
