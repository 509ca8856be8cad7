//! Curated reference data: sideletter rules and state tax incentives. Both loads are
//! insert-if-absent so they can be re-run against a populated catalog.

use std::path::Path;

use anyhow::{Context, Result};
use reelrate_adapters::read_json_file;
use reelrate_core::{SideletterRule, TaxIncentive};
use reelrate_storage::CatalogStore;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::LoadSummary;

/// Sideletter rules from a `.json` or `.yaml`/`.yml` list.
pub fn read_sideletters(path: &Path) -> Result<Vec<SideletterRule>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        return read_json_file(path);
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub async fn load_sideletters(
    store: &dyn CatalogStore,
    rules: &[SideletterRule],
) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    for rule in rules {
        let name = &rule.sideletter_name;
        if store
            .find_sideletter(name)
            .await
            .with_context(|| format!("looking up sideletter {name}"))?
            .is_some()
        {
            info!(sideletter = %name, "sideletter already loaded");
            summary.skipped += 1;
            continue;
        }
        match store.insert_sideletter(rule).await {
            Ok(()) => summary.inserted += 1,
            Err(err) if err.is_connection_level() => {
                return Err(err).context("sideletter load aborted");
            }
            Err(err) => {
                warn!(sideletter = %name, error = %err, "sideletter insert failed");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

/// Numbers in the extracted file are sometimes quoted.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .replace(['$', ','], "")
            .parse()
            .ok(),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
struct IncentiveBlock {
    #[serde(default, deserialize_with = "lenient_number")]
    min_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    max_percent: Option<f64>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    mechanism: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LaborBlock {
    #[serde(default, deserialize_with = "lenient_number")]
    resident_atl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    resident_btl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    non_resident_atl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    non_resident_btl: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct QualifiedSpendBlock {
    #[serde(default, deserialize_with = "lenient_number")]
    percent: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CapsBlock {
    #[serde(default, deserialize_with = "lenient_number")]
    minimum_spend: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    project_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    annual_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    compensation_cap: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct UpliftsBlock {
    #[serde(default)]
    labor: Option<JsonValue>,
    #[serde(default)]
    spend: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct StateRecord {
    state: String,
    #[serde(default)]
    incentive: IncentiveBlock,
    #[serde(default)]
    labor: LaborBlock,
    #[serde(default)]
    qualified_spend: QualifiedSpendBlock,
    #[serde(default)]
    minimums_caps: CapsBlock,
    #[serde(default)]
    uplifts: UpliftsBlock,
    #[serde(default)]
    requirements: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct TaxIncentiveFile {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    extracted_at: Option<JsonValue>,
    states: Vec<StateRecord>,
}

/// Uplifts are stored as text; structured uplifts keep their JSON form.
fn uplift_text(value: Option<JsonValue>) -> Option<String> {
    match value? {
        JsonValue::Null => None,
        JsonValue::String(s) if s.trim().is_empty() => None,
        JsonValue::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn non_empty_json(value: Option<JsonValue>) -> Option<JsonValue> {
    value.filter(|v| match v {
        JsonValue::Null => false,
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        _ => true,
    })
}

/// Incentive rows from the extracted state file plus the number of states skipped
/// for lacking a minimum incentive percentage.
pub fn tax_incentives_from_file(path: &Path) -> Result<(Vec<TaxIncentive>, usize)> {
    let file: TaxIncentiveFile = read_json_file(path)?;
    let extracted_at = file.extracted_at.map(|v| match v {
        JsonValue::String(s) => s,
        other => other.to_string(),
    });

    let mut skipped = 0;
    let mut incentives = Vec::new();
    for record in file.states {
        if !record.incentive.min_percent.is_some_and(|p| p != 0.0) {
            skipped += 1;
            continue;
        }
        incentives.push(TaxIncentive {
            state: record.state,
            country: "US".to_string(),
            incentive_min_percent: record.incentive.min_percent,
            incentive_max_percent: record.incentive.max_percent,
            incentive_type: record.incentive.kind,
            incentive_mechanism: record.incentive.mechanism,
            resident_atl_percent: record.labor.resident_atl,
            resident_btl_percent: record.labor.resident_btl,
            non_resident_atl_percent: record.labor.non_resident_atl,
            non_resident_btl_percent: record.labor.non_resident_btl,
            qualified_spend_percent: record.qualified_spend.percent,
            minimum_spend: record.minimums_caps.minimum_spend,
            project_cap: record.minimums_caps.project_cap,
            annual_cap: record.minimums_caps.annual_cap,
            compensation_cap: record.minimums_caps.compensation_cap,
            labor_uplifts: uplift_text(record.uplifts.labor),
            spend_uplifts: uplift_text(record.uplifts.spend),
            requirements: non_empty_json(record.requirements),
            source: file.source.clone(),
            extracted_at: extracted_at.clone(),
        });
    }
    Ok((incentives, skipped))
}

/// Insert incentives for states not yet in the catalog. Failures on one state are
/// logged and counted; the rest still load.
pub async fn load_tax_incentives(
    store: &dyn CatalogStore,
    incentives: &[TaxIncentive],
) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    for incentive in incentives {
        let state = &incentive.state;
        if store
            .find_tax_incentive(state)
            .await
            .with_context(|| format!("looking up incentive for {state}"))?
            .is_some()
        {
            summary.skipped += 1;
            continue;
        }
        match store.insert_tax_incentive(incentive).await {
            Ok(id) => {
                info!(%state, %id, "tax incentive loaded");
                summary.inserted += 1;
            }
            Err(err) if err.is_connection_level() => {
                return Err(err).context("tax incentive load aborted");
            }
            Err(err) => {
                warn!(%state, error = %err, "tax incentive insert failed");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}
