//! File-system extraction jobs: contract PDFs to text, text to rate batches, and
//! budget PDFs to template JSON plus a CSV summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use reelrate_adapters::pdf::{load_pages, render_contract_text};
use reelrate_adapters::{
    extract_budget, failed_budget, safe_output_name, BudgetParserConfig, RateExtractor,
    WgaScheduleExtractor,
};
use reelrate_core::{BudgetTemplate, PageContent, RateBatch, RawRate, UnionRateFile};
use reelrate_storage::TextArtifactStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{collect_files, relative_display, write_json_file};

/// Directories under the contracts root that hold outputs, not inputs.
const SKIPPED_CONTRACT_DIRS: &[&str] = &["extracted_text", "extracted"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextExtractionSummary {
    pub extracted: usize,
    pub already_present: usize,
    pub failed: usize,
}

pub(crate) async fn read_pages(path: PathBuf) -> Result<Vec<PageContent>> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || load_pages(&path))
        .await
        .with_context(|| format!("pdf worker for {display} panicked"))?
        .map_err(anyhow::Error::from)
}

/// Extract the text of every `<union dir>/*.pdf` under `contracts_dir` into the
/// artifact store as `<union dir>/<stem>.txt`. Existing text files are kept.
pub async fn extract_text_dir(
    contracts_dir: &Path,
    store: &TextArtifactStore,
) -> Result<TextExtractionSummary> {
    let mut summary = TextExtractionSummary::default();
    let mut union_dirs: Vec<PathBuf> = fs::read_dir(contracts_dir)
        .with_context(|| format!("reading {}", contracts_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| {
                    !name.starts_with('.') && !SKIPPED_CONTRACT_DIRS.contains(&name)
                })
        })
        .collect();
    union_dirs.sort();

    for union_dir in union_dirs {
        let Some(dir_name) = union_dir.file_name().map(PathBuf::from) else {
            continue;
        };
        let pdfs = collect_files(&union_dir, "pdf", false)?;
        if pdfs.is_empty() {
            continue;
        }
        info!(dir = %dir_name.display(), pdfs = pdfs.len(), "extracting contract text");

        for pdf in pdfs {
            let (Some(stem), Some(file_name)) = (pdf.file_stem(), pdf.file_name()) else {
                continue;
            };
            let relative = dir_name.join(format!("{}.txt", stem.to_string_lossy()));
            if store.exists(&relative).await? {
                debug!(path = %relative.display(), "text already extracted");
                summary.already_present += 1;
                continue;
            }

            let pages = match read_pages(pdf.clone()).await {
                Ok(pages) => pages,
                Err(err) => {
                    warn!(
                        pdf = %pdf.display(),
                        error = %format!("{err:#}"),
                        "pdf could not be read"
                    );
                    summary.failed += 1;
                    continue;
                }
            };
            let Some(text) = render_contract_text(&pages, &file_name.to_string_lossy()) else {
                warn!(pdf = %pdf.display(), "no text extracted");
                summary.failed += 1;
                continue;
            };

            let stored = store.store_text(&relative, &text).await?;
            info!(
                path = %stored.relative_path.display(),
                pages = pages.len(),
                bytes = stored.byte_size,
                sha256 = %stored.content_hash,
                "extracted contract text"
            );
            summary.extracted += 1;
        }
    }

    Ok(summary)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateExtractionSummary {
    pub files: usize,
    pub rates_found: usize,
    pub unique_rates: usize,
    pub per_union: BTreeMap<String, usize>,
}

/// File name of the per-union rate file.
pub fn union_file_name(union_local: &str) -> String {
    format!("{}.json", union_local.replace([' ', '/'], "_"))
}

fn batch_version(extractor: &dyn RateExtractor) -> Option<u32> {
    extractor.name().strip_prefix('v').and_then(|v| v.parse().ok())
}

/// Run `extractor` over every `.txt` under `text_dir`, then write `all_rates.json`
/// and one file per union into `out_dir`.
pub fn extract_rates_dir(
    text_dir: &Path,
    out_dir: &Path,
    extractor: &dyn RateExtractor,
) -> Result<RateExtractionSummary> {
    let files = collect_files(text_dir, "txt", true)?;
    let mut all = Vec::new();

    for file in &files {
        let relative = relative_display(text_dir, file);
        let text = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(err) => {
                warn!(file = %relative, error = %err, "text file skipped");
                continue;
            }
        };
        let rates = extractor.extract(&text, &relative);
        debug!(file = %relative, rates = rates.len(), "processed text file");
        all.extend(rates);
    }

    let rates_found = all.len();
    let unique = extractor.dedupe(all);

    let mut by_union: BTreeMap<String, Vec<RawRate>> = BTreeMap::new();
    for rate in &unique {
        by_union.entry(rate.union_local.clone()).or_default().push(rate.clone());
    }

    let mut batch = RateBatch::new(Utc::now(), unique);
    batch.version = batch_version(extractor);
    batch.total_files = Some(files.len());
    write_json_file(&out_dir.join("all_rates.json"), &batch)?;

    let mut per_union = BTreeMap::new();
    for (union_local, rates) in by_union {
        per_union.insert(union_local.clone(), rates.len());
        let file = UnionRateFile {
            rate_count: rates.len(),
            union_local,
            rates,
        };
        write_json_file(&out_dir.join(union_file_name(&file.union_local)), &file)?;
    }

    let summary = RateExtractionSummary {
        files: files.len(),
        rates_found,
        unique_rates: batch.total_rates,
        per_union,
    };
    info!(
        extractor = extractor.name(),
        files = summary.files,
        found = summary.rates_found,
        unique = summary.unique_rates,
        "rate extraction finished"
    );
    Ok(summary)
}

/// Extract the WGA schedule of minimums from one text file and write the batch.
pub fn extract_wga(
    text_path: &Path,
    output: &Path,
    extractor: &WgaScheduleExtractor,
) -> Result<RateBatch<RawRate>> {
    let text = fs::read_to_string(text_path)
        .with_context(|| format!("reading {}", text_path.display()))?;
    let source = text_path.display().to_string();
    let rates = extractor.dedupe(extractor.extract(&text, &source));

    let mut batch = RateBatch::new(Utc::now(), rates);
    batch.source = Some(source);
    write_json_file(output, &batch)?;
    info!(rates = batch.total_rates, output = %output.display(), "wga extraction finished");
    Ok(batch)
}

/// File-name keywords that mark production budgets among other PDFs.
pub const PRODUCTION_BUDGET_KEYWORDS: &[&str] = &["2021", "Pilot", "Cable", "Multicam", "One Hour"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BudgetExtractionSummary {
    pub processed: usize,
    pub saved: usize,
    pub no_data: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
struct BudgetSummaryRow<'a> {
    filename: &'a str,
    location: &'a str,
    production_type: &'a str,
    total_budget: Option<f64>,
    departments_found: usize,
    line_items_found: usize,
    total_pages: usize,
    status: BudgetStatus,
}

/// Outcome of one budget PDF, as reported in the summary CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Success,
    NoData,
    Error,
}

impl BudgetStatus {
    pub fn of(template: &BudgetTemplate) -> Self {
        if template.extraction_stats.error.is_some() {
            Self::Error
        } else if template.departments.is_empty() {
            Self::NoData
        } else {
            Self::Success
        }
    }
}

/// Parse every budget PDF under `budgets_dir` whose name contains one of
/// `keywords` (all PDFs when empty). Templates with departments are written as
/// JSON; every file gets a row in `extraction_summary.csv`.
pub async fn extract_budgets_dir(
    budgets_dir: &Path,
    out_dir: &Path,
    config: BudgetParserConfig,
    keywords: &[&str],
) -> Result<BudgetExtractionSummary> {
    let pdfs: Vec<PathBuf> = collect_files(budgets_dir, "pdf", true)?
        .into_iter()
        .filter(|path| {
            keywords.is_empty()
                || path
                    .file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|name| keywords.iter().any(|kw| name.contains(kw)))
        })
        .collect();
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut summary = BudgetExtractionSummary::default();
    let mut results = Vec::with_capacity(pdfs.len());

    for pdf in pdfs {
        let filename = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let template = match read_pages(pdf.clone()).await {
            Ok(pages) => {
                let mut template = extract_budget(&pages, &filename, config);
                template.metadata.pdf_path = Some(pdf.display().to_string());
                template
            }
            Err(err) => {
                warn!(
                    pdf = %pdf.display(),
                    error = %format!("{err:#}"),
                    "budget pdf could not be read"
                );
                failed_budget(&filename, &format!("{err:#}"))
            }
        };

        summary.processed += 1;
        match BudgetStatus::of(&template) {
            BudgetStatus::Success => {
                let path = out_dir.join(format!("{}.json", safe_output_name(&filename)));
                write_json_file(&path, &template)?;
                info!(
                    file = %filename,
                    departments = template.departments.len(),
                    line_items = template.line_item_count(),
                    "saved budget template"
                );
                summary.saved += 1;
            }
            BudgetStatus::Error => summary.failed += 1,
            BudgetStatus::NoData => {
                warn!(file = %filename, "no departments extracted");
                summary.no_data += 1;
            }
        }
        results.push(template);
    }

    write_budget_summary_csv(&out_dir.join("extraction_summary.csv"), &results)?;
    Ok(summary)
}

pub fn write_budget_summary_csv(path: &Path, results: &[BudgetTemplate]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for template in results {
        let meta = &template.metadata;
        let stats = &template.extraction_stats;
        writer
            .serialize(BudgetSummaryRow {
                filename: &meta.filename,
                location: meta.location.as_deref().unwrap_or_default(),
                production_type: meta.production_type.as_deref().unwrap_or_default(),
                total_budget: meta.total_budget,
                departments_found: stats.departments_found,
                line_items_found: stats.line_items_found,
                total_pages: stats.total_pages,
                status: BudgetStatus::of(template),
            })
            .with_context(|| format!("writing {}", path.display()))?;
    }
    writer.flush().with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
