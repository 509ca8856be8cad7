//! Source adapters: PDF collaborator wrapper, union identification, rate extractors,
//! budget table parsing and reference-manual helpers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub mod budget;
pub mod extractor;
pub mod pdf;
pub mod rate_line;
pub mod reference;
pub mod union;

pub use budget::{
    extract_budget, failed_budget, safe_output_name, BudgetParserConfig, BudgetTableParser,
};
pub use extractor::{dedupe_raw_rates, LineRateExtractor, RateExtractor, WgaScheduleExtractor};
pub use rate_line::ExtractorProfile;
pub use union::{effective_dates, union_for_path};

pub const CRATE_NAME: &str = "reelrate-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("loading pdf {path}")]
    Pdf {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
    #[error("no extractable text in {0}")]
    NoText(PathBuf),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Registry of rate extractors by name: `v1`, `v2` (the default line walker) and `wga`.
pub fn extractor_for(name: &str) -> Option<Box<dyn RateExtractor>> {
    match name {
        "v1" | "legacy" => Some(Box::new(LineRateExtractor::new(ExtractorProfile::legacy()))),
        "v2" | "standard" => Some(Box::new(LineRateExtractor::new(ExtractorProfile::standard()))),
        "wga" => Some(Box::new(WgaScheduleExtractor::default())),
        _ => None,
    }
}

pub fn extractor_names() -> &'static [&'static str] {
    &["v1", "v2", "wga"]
}

pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_every_listed_extractor() {
        for name in extractor_names() {
            let extractor = extractor_for(name).expect("registered");
            assert_eq!(extractor.name(), *name);
        }
        assert!(extractor_for("v3").is_none());
    }

    #[test]
    fn json_errors_name_the_file() {
        let err =
            read_json_file::<serde_json::Value>("/nonexistent/rates.json").expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/rates.json"));
    }
}
