//! Cleaning pass between extraction and upload: title normalisation, rate bands,
//! rate-type refinement and dedupe.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reelrate_adapters::read_json_file;
use reelrate_core::{
    amount_cents, CleanRate, CleanedRateFile, RateBatch, RateType, RawRate, UNKNOWN_UNION,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::write_json_file;

static FOOTNOTE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\s*$").unwrap());
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[().,]+$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static Y_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+Y-\s*$").unwrap());
static DOT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\.\s*$").unwrap());
static NUMERIC_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s./-]+$").unwrap());
static PERIOD_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{2,4})").unwrap());

const MIN_TITLE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateBand {
    pub min: f64,
    pub max: f64,
}

impl RateBand {
    pub fn contains(&self, amount: f64) -> bool {
        amount >= self.min && amount <= self.max
    }
}

/// Tunables of the cleaning pass; `rules/cleaning.yaml` overrides any of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningRules {
    pub garbage_phrases: Vec<String>,
    pub generic_words: Vec<String>,
    pub hourly_band: RateBand,
    pub weekly_band: RateBand,
    pub other_band: RateBand,
    pub default_effective_date: NaiveDate,
    pub default_production_type: String,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            garbage_phrases: [
                "effective july",
                "effective december",
                "effective august",
                "drivers of forty",
                "drivers of thirty",
                "drivers of other vehicles which",
                "non-affiliate accountants group",
                "specialized equipment driver rate",
                "rate effective",
                "group effective",
                "gen. foreman",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            generic_words: ["page", "code", "weekly", "hourly", "daily", "rate", "schedule"]
                .into_iter()
                .map(String::from)
                .collect(),
            hourly_band: RateBand { min: 20.0, max: 500.0 },
            weekly_band: RateBand { min: 500.0, max: 15000.0 },
            other_band: RateBand { min: 20.0, max: 15000.0 },
            default_effective_date: NaiveDate::from_ymd_opt(2024, 8, 4).unwrap_or_default(),
            default_production_type: "theatrical".to_string(),
        }
    }
}

impl CleaningRules {
    /// Built-in rules, overridden by the YAML file when it exists.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no cleaning rules file; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    fn band_for(&self, rate_type: RateType) -> RateBand {
        match rate_type {
            RateType::Hourly => self.hourly_band,
            RateType::Weekly => self.weekly_band,
            _ => self.other_band,
        }
    }

    pub fn clean_job_title(&self, title: &str) -> Option<String> {
        let mut title = title.trim().to_string();
        if title.is_empty() || title.starts_with("mos. in Industry") {
            return None;
        }

        let lower = title.to_lowercase();
        if self.garbage_phrases.iter().any(|phrase| lower.contains(phrase.as_str())) {
            return None;
        }

        loop {
            let before = title.clone();
            for pattern in [&*FOOTNOTE_DIGITS, &*TRAILING_PUNCT, &*Y_SUFFIX, &*DOT_SUFFIX] {
                let stripped = pattern.replace(&title, "").trim().to_string();
                title = stripped;
            }
            let collapsed = WHITESPACE.replace_all(&title, " ").into_owned();
            title = collapsed;
            if title == before {
                break;
            }
        }

        if is_all_caps(&title) {
            title = title_case(&title);
        }

        if title.chars().count() < MIN_TITLE_LEN || NUMERIC_PUNCT.is_match(&title) {
            return None;
        }
        let lower = title.to_lowercase();
        if self.generic_words.iter().any(|word| *word == lower) {
            return None;
        }
        Some(title)
    }

    /// Start date of an effective period: the first `m/d/yy` or `m/d/yyyy` in it,
    /// two-digit years read as 20yy. Falls back to the default date.
    pub fn parse_effective_date(&self, period: &str) -> NaiveDate {
        PERIOD_DATE
            .captures(period)
            .and_then(|caps| {
                let month: u32 = caps[1].parse().ok()?;
                let day: u32 = caps[2].parse().ok()?;
                let year: i32 = match caps[3].len() {
                    2 => 2000 + caps[3].parse::<i32>().ok()?,
                    4 => caps[3].parse().ok()?,
                    _ => return None,
                };
                NaiveDate::from_ymd_opt(year, month, day)
            })
            .unwrap_or(self.default_effective_date)
    }

    pub fn clean_rates(&self, raw: &[RawRate]) -> Vec<CleanRate> {
        let mut seen = HashSet::new();
        let mut cleaned = Vec::new();

        for rate in raw {
            if rate.union_local == UNKNOWN_UNION {
                continue;
            }
            let Some(title) = self.clean_job_title(&rate.job_classification) else {
                continue;
            };
            if !self.band_for(rate.rate_type).contains(rate.base_rate) {
                continue;
            }

            let rate_type = match rate.rate_type {
                RateType::Hourly | RateType::Weekly => RateType::from_amount(rate.base_rate),
                other => other,
            };

            let key = (
                rate.union_local.clone(),
                title.clone(),
                amount_cents(rate.base_rate),
                rate_type,
            );
            if !seen.insert(key) {
                continue;
            }

            cleaned.push(CleanRate {
                union_local: rate.union_local.clone(),
                job_classification: title,
                rate_type,
                base_rate: rate.base_rate,
                effective_date: self.parse_effective_date(&rate.effective_period),
                location: None,
                production_type: Some(self.default_production_type.clone()),
            });
        }

        cleaned
    }
}

fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_lowercase)
}

/// Capitalise the first letter of every alphabetic run, lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanSummary {
    pub raw_rates: usize,
    pub clean_rates: usize,
}

/// Read an extraction batch, clean it and write the cleaned file.
pub fn clean_rate_file(input: &Path, output: &Path, rules: &CleaningRules) -> Result<CleanSummary> {
    let batch: RateBatch<RawRate> = read_json_file(input)?;
    let rates = rules.clean_rates(&batch.rates);
    let summary = CleanSummary {
        raw_rates: batch.rates.len(),
        clean_rates: rates.len(),
    };

    let file = CleanedRateFile {
        cleaned_at: Utc::now(),
        total_rates: rates.len(),
        rates,
    };
    write_json_file(output, &file)?;
    info!(
        raw = summary.raw_rates,
        clean = summary.clean_rates,
        output = %output.display(),
        "cleaned rates"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(union: &str, title: &str, rate: f64, rate_type: RateType, period: &str) -> RawRate {
        RawRate {
            union_local: union.to_string(),
            craft: String::new(),
            job_classification: title.to_string(),
            occupation_code: String::new(),
            base_rate: rate,
            rate_type,
            effective_period: period.to_string(),
            section: None,
            source_file: String::new(),
        }
    }

    #[test]
    fn titles_are_normalised() {
        let rules = CleaningRules::default();
        assert_eq!(rules.clean_job_title("  Gaffer 12 ").as_deref(), Some("Gaffer"));
        assert_eq!(rules.clean_job_title("KEY  GRIP.").as_deref(), Some("Key Grip"));
        assert_eq!(rules.clean_job_title("Set Painter Y-").as_deref(), Some("Set Painter"));
        assert_eq!(rules.clean_job_title("Boom Operator (").as_deref(), Some("Boom Operator"));
        assert_eq!(
            rules.clean_job_title("Still Photographer, 1st 6 months").as_deref(),
            Some("Still Photographer, 1st 6 months")
        );
    }

    #[test]
    fn garbage_titles_are_dropped() {
        let rules = CleaningRules::default();
        assert_eq!(rules.clean_job_title("mos. in Industry Group"), None);
        assert_eq!(rules.clean_job_title("Rate effective 8/4/24"), None);
        assert_eq!(rules.clean_job_title("Gen. Foreman Plumber"), None);
        assert_eq!(rules.clean_job_title("Key"), None);
        assert_eq!(rules.clean_job_title("12 / 34 - 5"), None);
        assert_eq!(rules.clean_job_title("Schedule"), None);
        assert_eq!(rules.clean_job_title(""), None);
    }

    #[test]
    fn titles_that_strip_down_to_nothing_useful_are_dropped() {
        let rules = CleaningRules::default();
        assert_eq!(rules.clean_job_title("12345"), None);
        assert_eq!(rules.clean_job_title("Rate 12"), None);
        assert_eq!(rules.clean_job_title("HOURLY 3."), None);
        assert_eq!(rules.clean_job_title("Drivers of Forty Passenger Buses"), None);
        assert_eq!(rules.clean_job_title("Page 7"), None);
        assert_eq!(rules.clean_job_title("Rate Clerk 2").as_deref(), Some("Rate Clerk"));
    }

    #[test]
    fn effective_dates_use_the_first_date() {
        let rules = CleaningRules::default();
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("date");
        assert_eq!(rules.parse_effective_date("8/4/24-8/2/25"), date(2024, 8, 4));
        assert_eq!(rules.parse_effective_date("7/1/2024"), date(2024, 7, 1));
        assert_eq!(rules.parse_effective_date("13/45/24"), date(2024, 8, 4));
        assert_eq!(rules.parse_effective_date(""), date(2024, 8, 4));
    }

    #[test]
    fn bands_refinement_and_dedupe() {
        let rules = CleaningRules::default();
        let rates = vec![
            raw("IATSE Local 600", "Camera Operator", 3335.48, RateType::Weekly, "8/4/24-8/2/25"),
            raw("IATSE Local 600", "Camera Operator", 3335.48, RateType::Weekly, "8/4/24-8/2/25"),
            raw("IATSE Local 600", "Camera Utility", 12.0, RateType::Hourly, ""),
            raw("IATSE Local 600", "Digital Imaging Technician", 500.0, RateType::Hourly, ""),
            raw("IATSE Local 600", "Camera Trainee", 16000.0, RateType::Weekly, ""),
            raw("WGA", "Rewrite (High Budget)", 60000.0, RateType::Flat, "2025-05-02"),
            raw("DGA", "Director Daily", 1631.0, RateType::Daily, ""),
            raw(UNKNOWN_UNION, "Best Boy Grip", 2000.0, RateType::Weekly, ""),
        ];
        let cleaned = rules.clean_rates(&rates);
        let found: Vec<_> = cleaned
            .iter()
            .map(|r| (r.job_classification.as_str(), r.rate_type))
            .collect();

        assert_eq!(
            found,
            vec![
                ("Camera Operator", RateType::Weekly),
                ("Digital Imaging Technician", RateType::Weekly),
                ("Director Daily", RateType::Daily),
            ]
        );
        assert_eq!(cleaned[0].effective_date, NaiveDate::from_ymd_opt(2024, 8, 4).expect("date"));
        assert!(cleaned.iter().all(|r| r.production_type.as_deref() == Some("theatrical")));
        assert!(cleaned.iter().all(|r| r.location.is_none()));
    }

    #[test]
    fn cleaning_is_a_fixpoint() {
        let rules = CleaningRules::default();
        let rates = vec![
            raw(
                "IATSE Local 728",
                "CHIEF LIGHTING TECHNICIAN 3",
                2417.60,
                RateType::Weekly,
                "8/4/24-8/2/25",
            ),
            raw(
                "IATSE Local 728",
                "Rigging Gaffer, 1st 6 months",
                57.62,
                RateType::Hourly,
                "8/4/24-8/2/25",
            ),
            raw("IATSE Local 80", "Dolly Grip", 499.99, RateType::Hourly, "1/1/25"),
        ];
        let once = rules.clean_rates(&rates);
        let again = rules.clean_rates(&once.iter().map(CleanRate::to_raw).collect::<Vec<_>>());
        assert_eq!(once, again);
        assert_eq!(once[0].job_classification, "Chief Lighting Technician");
    }

    #[test]
    fn yaml_overrides_only_what_it_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cleaning.yaml");
        let yaml = "default_production_type: episodic_tv\nhourly_band: { min: 15, max: 400 }\n";
        std::fs::write(&path, yaml).expect("write rules");
        let rules = CleaningRules::load(&path).expect("rules");
        assert_eq!(rules.default_production_type, "episodic_tv");
        assert_eq!(rules.hourly_band, RateBand { min: 15.0, max: 400.0 });
        assert_eq!(rules.weekly_band, CleaningRules::default().weekly_band);

        let missing = CleaningRules::load(dir.path().join("absent.yaml")).expect("defaults");
        assert_eq!(missing, CleaningRules::default());
    }
}
