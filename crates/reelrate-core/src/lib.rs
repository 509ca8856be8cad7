//! Core domain model for reelrate: rate records, agreements, reference tables and
//! the budget template hierarchy.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const CRATE_NAME: &str = "reelrate-core";

/// Amounts below this are treated as hourly when no explicit marker exists.
pub const HOURLY_WEEKLY_THRESHOLD: f64 = 500.0;

pub const UNKNOWN_UNION: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    Hourly,
    Daily,
    Weekly,
    Flat,
    Episode,
    Program,
    Percentage,
}

impl RateType {
    /// Hourly below [`HOURLY_WEEKLY_THRESHOLD`], weekly otherwise. An approximation,
    /// not a ground truth.
    pub fn from_amount(amount: f64) -> Self {
        if amount < HOURLY_WEEKLY_THRESHOLD {
            RateType::Hourly
        } else {
            RateType::Weekly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Hourly => "hourly",
            RateType::Daily => "daily",
            RateType::Weekly => "weekly",
            RateType::Flat => "flat",
            RateType::Episode => "episode",
            RateType::Program => "program",
            RateType::Percentage => "percentage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hourly" => Some(RateType::Hourly),
            "daily" => Some(RateType::Daily),
            "weekly" => Some(RateType::Weekly),
            "flat" => Some(RateType::Flat),
            "episode" => Some(RateType::Episode),
            "program" => Some(RateType::Program),
            "percentage" => Some(RateType::Percentage),
            _ => None,
        }
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Union local and craft a contract file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionInfo {
    pub union_local: String,
    pub craft: String,
}

impl Default for UnionInfo {
    fn default() -> Self {
        Self {
            union_local: UNKNOWN_UNION.to_string(),
            craft: UNKNOWN_UNION.to_string(),
        }
    }
}

impl UnionInfo {
    pub fn new(union_local: impl Into<String>, craft: impl Into<String>) -> Self {
        Self {
            union_local: union_local.into(),
            craft: craft.into(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.union_local != UNKNOWN_UNION
    }
}

/// Rate record as produced by an extractor, before cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRate {
    pub union_local: String,
    #[serde(default)]
    pub craft: String,
    pub job_classification: String,
    #[serde(default)]
    pub occupation_code: String,
    pub base_rate: f64,
    pub rate_type: RateType,
    #[serde(default)]
    pub effective_period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default)]
    pub source_file: String,
}

impl RawRate {
    /// Order-preserving dedupe key: union, title, rate (in cents), type.
    pub fn dedupe_key(&self) -> (String, String, i64, RateType) {
        (
            self.union_local.clone(),
            self.job_classification.clone(),
            amount_cents(self.base_rate),
            self.rate_type,
        )
    }
}

/// Validated rate ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRate {
    pub union_local: String,
    pub job_classification: String,
    pub rate_type: RateType,
    pub base_rate: f64,
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub production_type: Option<String>,
}

impl CleanRate {
    /// Re-expresses the record in extractor form so it can be fed back through cleaning.
    pub fn to_raw(&self) -> RawRate {
        RawRate {
            union_local: self.union_local.clone(),
            craft: String::new(),
            job_classification: self.job_classification.clone(),
            occupation_code: String::new(),
            base_rate: self.base_rate,
            rate_type: self.rate_type,
            effective_period: self.effective_date.format("%-m/%-d/%Y").to_string(),
            section: None,
            source_file: String::new(),
        }
    }

    pub fn lookup(&self) -> RateCardLookup {
        RateCardLookup {
            union_local: self.union_local.clone(),
            job_classification: self.job_classification.clone(),
            rate_type: Some(self.rate_type),
            base_rate: self.base_rate,
        }
    }
}

/// Persisted rate card row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
    pub id: Uuid,
    pub union_local: String,
    pub job_classification: String,
    pub rate_type: RateType,
    pub base_rate: f64,
    pub location: Option<String>,
    pub production_type: Option<String>,
    pub effective_date: NaiveDate,
    pub agreement_id: Option<Uuid>,
}

impl RateCard {
    pub fn from_clean(rate: &CleanRate, agreement_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            union_local: rate.union_local.clone(),
            job_classification: rate.job_classification.clone(),
            rate_type: rate.rate_type,
            base_rate: rate.base_rate,
            location: rate.location.clone(),
            production_type: rate.production_type.clone(),
            effective_date: rate.effective_date,
            agreement_id,
        }
    }

    pub fn key(&self) -> RateCardKey {
        RateCardKey {
            union_local: self.union_local.clone(),
            job_classification: self.job_classification.clone(),
            location: self.location.clone(),
            production_type: self.production_type.clone(),
            effective_date: self.effective_date,
        }
    }

    pub fn lookup(&self) -> RateCardLookup {
        RateCardLookup {
            union_local: self.union_local.clone(),
            job_classification: self.job_classification.clone(),
            rate_type: Some(self.rate_type),
            base_rate: self.base_rate,
        }
    }
}

/// Natural key of `rate_cards`; the upsert target. A missing location or production
/// type is part of the key, so two `None`s are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateCardKey {
    pub union_local: String,
    pub job_classification: String,
    pub location: Option<String>,
    pub production_type: Option<String>,
    pub effective_date: NaiveDate,
}

/// Point lookup used by skip-if-exists uploads. A `None` rate type matches any type.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCardLookup {
    pub union_local: String,
    pub job_classification: String,
    pub rate_type: Option<RateType>,
    pub base_rate: f64,
}

impl RateCardLookup {
    pub fn without_rate_type(mut self) -> Self {
        self.rate_type = None;
        self
    }

    pub fn matches(&self, card: &RateCard) -> bool {
        card.union_local == self.union_local
            && card.job_classification == self.job_classification
            && self.rate_type.map_or(true, |rt| rt == card.rate_type)
            && amount_cents(card.base_rate) == amount_cents(self.base_rate)
    }
}

/// Amount rounded to whole cents, for keys and comparisons.
pub fn amount_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// JSON envelope written by the extraction jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateBatch<T> {
    pub extracted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    pub total_rates: usize,
    pub rates: Vec<T>,
}

impl<T> RateBatch<T> {
    pub fn new(extracted_at: DateTime<Utc>, rates: Vec<T>) -> Self {
        Self {
            extracted_at,
            version: None,
            source: None,
            total_files: None,
            total_rates: rates.len(),
            rates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionRateFile {
    pub union_local: String,
    pub rate_count: usize,
    pub rates: Vec<RawRate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRateFile {
    pub cleaned_at: DateTime<Utc>,
    pub total_rates: usize,
    pub rates: Vec<CleanRate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: Uuid,
    pub name: String,
    pub short_name: String,
    pub union_name: String,
    pub effective_start: Option<NaiveDate>,
    pub effective_end: Option<NaiveDate>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
}

/// Supplementary contractual provision; reference data with no link to rate cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideletterRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub sideletter_name: String,
    #[serde(default)]
    pub production_type: Option<String>,
    #[serde(default)]
    pub distribution_platform: Option<String>,
    #[serde(default)]
    pub min_budget_amount: Option<f64>,
    #[serde(default)]
    pub max_budget_amount: Option<f64>,
    #[serde(default)]
    pub wage_adjustment_pct: f64,
    #[serde(default = "full_percent")]
    pub holiday_pay_pct: f64,
    #[serde(default = "full_percent")]
    pub vacation_pay_pct: f64,
    #[serde(default = "empty_object")]
    pub applies_when: JsonValue,
    #[serde(default)]
    pub applicable_unions: Vec<String>,
}

fn full_percent() -> f64 {
    100.0
}

fn empty_object() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

/// One row per state or jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaxIncentive {
    pub state: String,
    pub country: String,
    pub incentive_min_percent: Option<f64>,
    pub incentive_max_percent: Option<f64>,
    pub incentive_type: Option<String>,
    pub incentive_mechanism: Option<String>,
    pub resident_atl_percent: Option<f64>,
    pub resident_btl_percent: Option<f64>,
    pub non_resident_atl_percent: Option<f64>,
    pub non_resident_btl_percent: Option<f64>,
    pub qualified_spend_percent: Option<f64>,
    pub minimum_spend: Option<f64>,
    pub project_cap: Option<f64>,
    pub annual_cap: Option<f64>,
    pub compensation_cap: Option<f64>,
    pub labor_uplifts: Option<String>,
    pub spend_uplifts: Option<String>,
    pub requirements: Option<JsonValue>,
    pub source: Option<String>,
    pub extracted_at: Option<String>,
}

/// Budget period labels recognised in detail rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BudgetPeriod {
    Prep,
    Shoot,
    Wrap,
    Hiatus,
    Post,
}

impl BudgetPeriod {
    pub const ALL: [BudgetPeriod; 5] = [
        BudgetPeriod::Prep,
        BudgetPeriod::Shoot,
        BudgetPeriod::Wrap,
        BudgetPeriod::Hiatus,
        BudgetPeriod::Post,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetPeriod::Prep => "prep",
            BudgetPeriod::Shoot => "shoot",
            BudgetPeriod::Wrap => "wrap",
            BudgetPeriod::Hiatus => "hiatus",
            BudgetPeriod::Post => "post",
        }
    }

    /// Matches a position label equal to, or starting with `<period> `.
    pub fn classify(position: &str) -> Option<Self> {
        let lower = position.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|period| {
            let word = period.as_str();
            lower == word || lower.starts_with(&format!("{word} "))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PeriodBreakdown {
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub rate: Option<f64>,
    pub subtotal: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetailLine {
    pub position: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub multiplier: Option<f64>,
    pub rate: Option<f64>,
    pub subtotal: Option<f64>,
    pub total: Option<f64>,
}

impl DetailLine {
    pub fn has_amounts(&self) -> bool {
        self.quantity.is_some() || self.rate.is_some() || self.subtotal.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LineItem {
    pub account: String,
    pub description: String,
    pub position: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub rate: Option<f64>,
    pub subtotal: Option<f64>,
    pub total: Option<f64>,
    #[serde(default)]
    pub periods: BTreeMap<String, PeriodBreakdown>,
    #[serde(default)]
    pub detail_lines: Vec<DetailLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Department {
    pub name: Option<String>,
    pub account: Option<String>,
    pub total: Option<f64>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BudgetMetadata {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    pub location: Option<String>,
    pub production_type: Option<String>,
    pub shoot_days: Option<u32>,
    pub shoot_dates: Option<String>,
    pub total_budget: Option<f64>,
    pub atl_total: Option<f64>,
    pub btl_total: Option<f64>,
    pub other_total: Option<f64>,
    pub post_total: Option<f64>,
    pub production_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractionStats {
    #[serde(default)]
    pub total_pages: usize,
    #[serde(default)]
    pub departments_found: usize,
    #[serde(default)]
    pub line_items_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Department → line item → period decomposition of one budget PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BudgetTemplate {
    pub metadata: BudgetMetadata,
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub extraction_stats: ExtractionStats,
}

impl BudgetTemplate {
    pub fn line_item_count(&self) -> usize {
        self.departments.iter().map(|d| d.line_items.len()).sum()
    }
}

/// One table row as produced by PDF table extraction.
pub type TableRow = Vec<Option<String>>;

/// Page text plus any table rows the extraction library found on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PageContent {
    pub number: u32,
    pub text: String,
    #[serde(default)]
    pub tables: Vec<Vec<TableRow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDoc {
    pub id: Uuid,
    pub doc_name: String,
    pub doc_type: String,
    pub source: String,
    pub section: Option<String>,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub content: String,
    pub summary: String,
    pub topics: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_splits_hourly_and_weekly() {
        assert_eq!(RateType::from_amount(45.0), RateType::Hourly);
        assert_eq!(RateType::from_amount(499.99), RateType::Hourly);
        assert_eq!(RateType::from_amount(500.0), RateType::Weekly);
        assert_eq!(RateType::from_amount(2395.0), RateType::Weekly);
    }

    #[test]
    fn period_classification_accepts_exact_and_prefixed_labels() {
        assert_eq!(BudgetPeriod::classify("Shoot"), Some(BudgetPeriod::Shoot));
        assert_eq!(BudgetPeriod::classify("prep 2 weeks"), Some(BudgetPeriod::Prep));
        assert_eq!(BudgetPeriod::classify("Postage"), None);
        assert_eq!(BudgetPeriod::classify("Writer"), None);
    }

    #[test]
    fn clean_rate_round_trips_its_effective_date_through_raw_form() {
        let rate = CleanRate {
            union_local: "IATSE Local 728".into(),
            job_classification: "Gaffer".into(),
            rate_type: RateType::Weekly,
            base_rate: 2395.0,
            effective_date: NaiveDate::from_ymd_opt(2024, 8, 4).unwrap(),
            location: None,
            production_type: Some("theatrical".into()),
        };
        assert_eq!(rate.to_raw().effective_period, "8/4/2024");
    }

    #[test]
    fn lookup_compares_rates_to_the_cent() {
        let rate = CleanRate {
            union_local: "DGA".into(),
            job_classification: "First Assistant Director".into(),
            rate_type: RateType::Weekly,
            base_rate: 6676.0,
            effective_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            location: Some("Studio".into()),
            production_type: Some("hbsvod".into()),
        };
        let mut card = RateCard::from_clean(&rate, None);
        assert!(rate.lookup().matches(&card));
        card.base_rate = 6676.004;
        assert!(rate.lookup().matches(&card));
        card.base_rate = 6677.0;
        assert!(!rate.lookup().matches(&card));
        card.base_rate = 6676.0;
        card.rate_type = RateType::Flat;
        assert!(!rate.lookup().matches(&card));
        assert!(rate.lookup().without_rate_type().matches(&card));
    }

    #[test]
    fn sideletter_defaults_fill_pay_percentages() {
        let rule: SideletterRule = serde_json::from_value(serde_json::json!({
            "sideletter_name": "P&H Contribution Ceiling - Half Hour",
            "applicable_unions": ["SAG-AFTRA"]
        }))
        .unwrap();
        assert_eq!(rule.holiday_pay_pct, 100.0);
        assert_eq!(rule.vacation_pay_pct, 100.0);
        assert_eq!(rule.wage_adjustment_pct, 0.0);
        assert!(rule.applies_when.is_object());
    }
}
