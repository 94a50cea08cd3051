//! Excel workbooks via `calamine`: one block per sheet, cells tab-separated.

use super::{ExtractedDocument, Extractor, file_title, parse_blocking};
use crate::error::Result;
use async_trait::async_trait;
use calamine::{Data, Range, Reader, open_workbook_auto};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetExtractor;

#[async_trait]
impl Extractor for SpreadsheetExtractor {
    fn extensions(&self) -> &[&str] {
        &["xlsx", "xls"]
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let owned = path.to_path_buf();
        let (text, sheets) = parse_blocking(path, move || {
            let mut workbook =
                open_workbook_auto(&owned).map_err(|e| format!("cannot open workbook: {e}"))?;

            let mut text = String::new();
            let names = workbook.sheet_names();
            for name in &names {
                let range = workbook
                    .worksheet_range(name)
                    .map_err(|e| format!("sheet '{name}': {e}"))?;
                text.push_str(&format!("\n=== Sheet: {name} ===\n{}\n", render_sheet(&range)));
            }
            Ok((text, names.len()))
        })
        .await?;

        Ok(ExtractedDocument {
            text,
            page_count: sheets,
            title: file_title(path),
        })
    }
}

/// Rows on separate lines, cells separated by tabs, trailing empty cells dropped.
fn render_sheet(range: &Range<Data>) -> String {
    range
        .rows()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
            let used = cells
                .iter()
                .rposition(|cell| !cell.is_empty())
                .map_or(0, |last| last + 1);
            cells[..used].join("\t")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
