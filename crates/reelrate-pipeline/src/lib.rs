//! Batch jobs that turn contract text, budget PDFs and curated reference files into
//! catalog rows. Each job is a plain async function over a [`CatalogStore`] so the
//! CLI can point it at Postgres or at an in-memory catalog for dry runs.
//!
//! [`CatalogStore`]: reelrate_storage::CatalogStore

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

pub mod clean;
pub mod config;
pub mod extract;
pub mod manual;
pub mod rate_table;
pub mod reference_data;
pub mod templates;
pub mod upload;

pub use clean::{clean_rate_file, CleanSummary, CleaningRules};
pub use config::{ConfigError, DatabaseConfig, PipelineConfig};
pub use extract::{
    extract_budgets_dir, extract_rates_dir, extract_text_dir, extract_wga,
    PRODUCTION_BUDGET_KEYWORDS,
};
pub use manual::{import_reference_docs, ManualImport};
pub use rate_table::{import_rate_table, RateTable, RateTableImport};
pub use reference_data::{
    load_sideletters, load_tax_incentives, read_sideletters, tax_incentives_from_file,
};
pub use templates::load_budget_templates;
pub use upload::{
    upload_cleaned_rates, upload_rate_cards, upload_wga_rates, UploadMode, UploadSummary,
};

pub const CRATE_NAME: &str = "reelrate-pipeline";

/// Rows written versus rows left alone because they were already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serializing json")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

/// Files under `dir` with extension `ext` (case-insensitive), sorted by path.
pub fn collect_files(dir: &Path, ext: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_into(dir, ext, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, ext: &str, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
    for entry in entries {
        let path = entry.with_context(|| format!("listing {}", dir.display()))?.path();
        if path.is_dir() {
            if recursive {
                collect_into(&path, ext, recursive, out)?;
            }
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches {
            out.push(path);
        }
    }
    Ok(())
}

/// `path` relative to `root` with forward slashes, or the full path if it is outside `root`.
pub fn relative_display(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_matching_files_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("b")).expect("mkdir");
        fs::write(dir.path().join("z.txt"), "z").expect("write");
        fs::write(dir.path().join("a.TXT"), "a").expect("write");
        fs::write(dir.path().join("notes.md"), "n").expect("write");
        fs::write(dir.path().join("b/inner.txt"), "i").expect("write");

        let flat = collect_files(dir.path(), "txt", false).expect("flat");
        let names: Vec<String> = flat.iter().map(|p| relative_display(dir.path(), p)).collect();
        assert_eq!(names, vec!["a.TXT", "z.txt"]);

        let deep = collect_files(dir.path(), "txt", true).expect("deep");
        let names: Vec<String> = deep.iter().map(|p| relative_display(dir.path(), p)).collect();
        assert_eq!(names, vec!["a.TXT", "b/inner.txt", "z.txt"]);
    }

    #[test]
    fn json_writer_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/out.json");
        write_json_file(&path, &serde_json::json!({"ok": true})).expect("write");
        let raw = fs::read_to_string(&path).expect("read");
        let back: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(back["ok"], true);
    }
}
