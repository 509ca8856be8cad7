//! Imports the budgeting software manual, pre-split into page-range PDF chunks, as
//! searchable reference documents.

use std::path::Path;

use anyhow::{Context, Result};
use reelrate_adapters::reference::{
    extract_section_title, extract_topics, parse_chunk_pages, summarize, DEFAULT_SUMMARY_LEN,
};
use reelrate_core::{PageContent, ReferenceDoc};
use reelrate_storage::CatalogStore;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collect_files;
use crate::extract::read_pages;

pub const MANUAL_DOC_NAME: &str = "Movie Magic Budgeting User Manual";
pub const MANUAL_DOC_TYPE: &str = "manual";
pub const MANUAL_SOURCE: &str = "47125706-MMB-User-Manual.pdf";

pub const ANALYSIS_DOC_NAME: &str = "Movie Magic Budgeting Analysis";
pub const ANALYSIS_DOC_TYPE: &str = "analysis";
const ANALYSIS_SECTION: &str = "Feature Analysis for AI Budget System";
const ANALYSIS_SUMMARY: &str = "Analysis of budgeting software features: account hierarchy, \
    fringes, globals, groups, shortcuts, currency, tax credits and an implementation roadmap.";
const ANALYSIS_TOPICS: &[&str] = &[
    "fringes",
    "budget_hierarchy",
    "globals",
    "groups",
    "units",
    "currency",
    "tax_incentives",
    "contractual_charges",
    "comparison",
    "shortcuts",
];

pub const PAGE_BREAK: &str = "\n\n--- PAGE BREAK ---\n\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManualImport {
    pub deleted: u64,
    pub chunks: usize,
    pub failed: usize,
    pub pages: usize,
    pub characters: usize,
    pub analysis_imported: bool,
}

/// One reference document per chunk; `None` when the chunk has no text.
pub fn chunk_document(chunk_filename: &str, pages: &[PageContent]) -> Option<ReferenceDoc> {
    let texts: Vec<&str> = pages
        .iter()
        .map(|p| p.text.as_str())
        .filter(|t| !t.trim().is_empty())
        .collect();
    if texts.is_empty() {
        return None;
    }
    let content = texts.join(PAGE_BREAK);
    let (page_start, page_end) = parse_chunk_pages(chunk_filename).unzip();
    Some(ReferenceDoc {
        id: Uuid::new_v4(),
        doc_name: MANUAL_DOC_NAME.to_string(),
        doc_type: MANUAL_DOC_TYPE.to_string(),
        source: MANUAL_SOURCE.to_string(),
        section: extract_section_title(&content),
        page_start,
        page_end,
        summary: summarize(&content, DEFAULT_SUMMARY_LEN),
        topics: extract_topics(&content),
        content,
    })
}

pub fn analysis_document(source_name: &str, content: String) -> ReferenceDoc {
    ReferenceDoc {
        id: Uuid::new_v4(),
        doc_name: ANALYSIS_DOC_NAME.to_string(),
        doc_type: ANALYSIS_DOC_TYPE.to_string(),
        source: source_name.to_string(),
        section: Some(ANALYSIS_SECTION.to_string()),
        page_start: None,
        page_end: None,
        content,
        summary: ANALYSIS_SUMMARY.to_string(),
        topics: ANALYSIS_TOPICS.iter().map(|t| t.to_string()).collect(),
    }
}

/// Replace the manual's documents with one per PDF chunk in `chunks_dir`, then
/// optionally the companion analysis markdown. A chunk that fails to parse is logged
/// and skipped.
pub async fn import_reference_docs(
    store: &dyn CatalogStore,
    chunks_dir: &Path,
    analysis: Option<&Path>,
) -> Result<ManualImport> {
    let chunks = collect_files(chunks_dir, "pdf", false)?;
    info!(chunks = chunks.len(), dir = %chunks_dir.display(), "importing reference manual");

    let mut summary = ManualImport {
        deleted: store
            .delete_reference_docs(MANUAL_DOC_NAME)
            .await
            .context("clearing previous manual entries")?,
        ..ManualImport::default()
    };

    for path in chunks {
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let pages = match read_pages(path.clone()).await {
            Ok(pages) => pages,
            Err(err) => {
                warn!(chunk = %filename, error = %format!("{err:#}"), "manual chunk unreadable");
                summary.failed += 1;
                continue;
            }
        };
        let Some(doc) = chunk_document(&filename, &pages) else {
            warn!(chunk = %filename, "manual chunk has no text");
            summary.failed += 1;
            continue;
        };
        store
            .insert_reference_doc(&doc)
            .await
            .with_context(|| format!("inserting manual chunk {filename}"))?;
        info!(
            chunk = %filename,
            topics = %doc.topics.join(", "),
            section = ?doc.section,
            "manual chunk imported"
        );
        summary.chunks += 1;
        summary.pages += pages.len();
        summary.characters += doc.content.chars().count();
    }

    if let Some(path) = analysis.filter(|p| p.exists()) {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let source = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        store
            .delete_reference_docs(ANALYSIS_DOC_NAME)
            .await
            .context("clearing previous analysis entry")?;
        store
            .insert_reference_doc(&analysis_document(source, content))
            .await
            .context("inserting analysis document")?;
        summary.analysis_imported = true;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageContent {
        PageContent {
            number,
            text: text.to_string(),
            tables: Vec::new(),
        }
    }

    #[test]
    fn chunk_joins_pages_and_reads_range_from_name() {
        let pages = [
            page(
                1,
                "CHAPTER FRINGES\nFringe benefits are applied to payroll accounts automatically.",
            ),
            page(2, "   "),
            page(3, "Each fringe can be a percentage or a flat amount per unit."),
        ];
        let doc = chunk_document("manual-pages-41-60.pdf", &pages).expect("doc");
        assert_eq!((doc.page_start, doc.page_end), (Some(41), Some(60)));
        assert_eq!(doc.content.matches("--- PAGE BREAK ---").count(), 1);
        assert_eq!(doc.section.as_deref(), Some("CHAPTER FRINGES"));
        assert!(doc.topics.contains(&"fringes".to_string()));
        assert_eq!(doc.doc_name, MANUAL_DOC_NAME);
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        assert!(chunk_document("chunk.pdf", &[page(1, "")]).is_none());
        let intro = [page(1, "Welcome to the budgeting manual for producers.")];
        let unnamed = chunk_document("intro.pdf", &intro).expect("doc");
        assert_eq!(unnamed.page_start, None);
    }
}
