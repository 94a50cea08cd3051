//! PowerPoint text: every `<a:t>` run of every slide, slides in slide order.

use super::{ExtractedDocument, Extractor, file_title, parse_blocking, read_bytes};
use crate::error::Result;
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct PptxExtractor;

#[async_trait]
impl Extractor for PptxExtractor {
    fn extensions(&self) -> &[&str] {
        &["pptx"]
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let bytes = read_bytes(path).await?;
        let slides = parse_blocking(path, move || read_slides(bytes)).await?;

        Ok(ExtractedDocument {
            text: slides.join("\n\n"),
            page_count: slides.len(),
            title: file_title(path),
        })
    }
}

/// Slide number of a `ppt/slides/slideN.xml` entry.
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn read_slides(bytes: Vec<u8>) -> std::result::Result<Vec<String>, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| format!("not a PPTX archive: {e}"))?;

    let mut entries: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    entries.sort();

    let mut slides = Vec::with_capacity(entries.len());
    for (_, name) in entries {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|e| format!("{name}: {e}"))?
            .read_to_string(&mut xml)
            .map_err(|e| format!("{name}: {e}"))?;
        slides.push(slide_text(&xml).map_err(|e| format!("{name}: {e}"))?);
    }
    Ok(slides)
}

/// Text runs of one slide. Paragraphs (`<a:p>`) end with a newline.
fn slide_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"a:t" => in_run = true,
            Event::End(e) => match e.name().as_ref() {
                b"a:t" => in_run = false,
                b"a:p" if !text.is_empty() && !text.ends_with('\n') => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text.trim_end().to_string())
}
