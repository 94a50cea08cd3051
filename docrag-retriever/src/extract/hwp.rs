use super::{ExtractedDocument, Extractor, file_title};
use crate::error::{Result, RetrieverError};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Converter shipped with pyhwp; prints the document text to stdout.
pub const DEFAULT_HWP_COMMAND: &str = "hwp5txt";

/// Hangul Word Processor documents, converted by an external command.
///
/// The command is invoked as `<command> <path>` and must write UTF-8 text to stdout.
#[derive(Debug, Clone)]
pub struct HwpExtractor {
    command: String,
}

impl Default for HwpExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_HWP_COMMAND)
    }
}

impl HwpExtractor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Extractor for HwpExtractor {
    fn extensions(&self) -> &[&str] {
        &["hwp"]
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let output = Command::new(&self.command)
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                let hint = if e.kind() == std::io::ErrorKind::NotFound {
                    " (is pyhwp installed?)"
                } else {
                    ""
                };
                RetrieverError::extraction(
                    path,
                    format!("cannot run '{}': {e}{hint}", self.command),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RetrieverError::extraction(
                path,
                format!(
                    "HWP parsing failed ({}): {}",
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        Ok(ExtractedDocument {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            page_count: 1,
            title: file_title(path),
        })
    }
}
