//! Renders search hits as a grounded answer context.
//!
//! The rendered block is meant to be handed to whatever writes the final
//! answer: it repeats the query, lists every hit with its provenance and
//! score, and states that only the listed content may be used.

use super::search::SearchHit;
use std::fmt::Write;

const RULE_WIDTH: usize = 80;

/// Render `hits` for `query`. `scope` names the searched collection, `None` meaning all of them.
pub fn render_grounded_context(query: &str, scope: Option<&str>, hits: &[SearchHit]) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_context(&mut out, query, scope, hits);
    out
}

fn write_context(
    out: &mut String,
    query: &str,
    scope: Option<&str>,
    hits: &[SearchHit],
) -> std::fmt::Result {
    writeln!(out, "Query: \"{query}\"")?;
    writeln!(out)?;

    if hits.is_empty() {
        writeln!(out, "No relevant information found in the indexed documents.")?;
        writeln!(out)?;
        match scope {
            Some(collection) => writeln!(
                out,
                "The information you're looking for is not available in collection \"{collection}\"."
            )?,
            None => writeln!(
                out,
                "The information you're looking for is not available in any collection."
            )?,
        }
        return Ok(());
    }

    match scope {
        Some(collection) => writeln!(
            out,
            "Found {} relevant chunks in collection \"{collection}\":",
            hits.len()
        )?,
        None => writeln!(
            out,
            "Found {} relevant chunks across all collections:",
            hits.len()
        )?,
    }
    writeln!(out)?;
    writeln!(
        out,
        "IMPORTANT: The following content is ONLY from indexed documents. Do NOT add external knowledge or assumptions."
    )?;
    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out)?;

    for (i, hit) in hits.iter().enumerate() {
        writeln!(out, "### Result {}", i + 1)?;
        writeln!(out, "**Collection:** {}", hit.metadata.collection)?;
        writeln!(
            out,
            "**Source:** {} (chunk #{})",
            hit.metadata.source, hit.metadata.chunk_index
        )?;
        writeln!(out, "**Relevance:** {:.1}%", hit.relevance_score * 100.0)?;
        writeln!(out)?;
        writeln!(out, "**Content:**")?;
        writeln!(out, "{}", hit.content)?;
        writeln!(out)?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(out, "All content above is from indexed documents.")?;
    writeln!(
        out,
        "Answer based ONLY on the content above. If the information is not present, say \"This information is not available in the documents.\""
    )
}
