//! Loads extracted budget template JSON into the catalog.

use std::path::Path;

use anyhow::{Context, Result};
use reelrate_adapters::read_json_file;
use reelrate_core::BudgetTemplate;
use reelrate_storage::{CatalogStore, NewBudgetTemplate};
use tracing::{info, warn};

use crate::{collect_files, LoadSummary};

const KNOWN_CITIES: &[&str] = &[
    "Atlanta",
    "Los Angeles",
    "Chicago",
    "Vancouver",
    "Toronto",
    "Montreal",
    "New Orleans",
    "Boston",
    "New York",
    "Pittsburgh",
    "Portland",
    "Santa Fe",
    "Charleston",
    "Wilmington",
];

pub const UNKNOWN_LOCATION: &str = "Unknown";

/// City name from a free-form location line such as `Atlanta, GA Shoot -15 Local Days`.
pub fn location_name(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return UNKNOWN_LOCATION.to_string();
    };
    let lower = raw.to_lowercase();
    if let Some(city) = KNOWN_CITIES.iter().find(|city| lower.contains(&city.to_lowercase())) {
        return city.to_string();
    }
    raw.split(',').next().unwrap_or(raw).trim().to_string()
}

pub fn production_type_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.contains("multicam") {
        "multi_cam"
    } else if lower.contains("pattern") {
        "pattern_budget"
    } else if lower.contains("amort") {
        "amortization"
    } else if lower.contains("pilot") || lower.contains("one hour") {
        "one_hour_pilot"
    } else if lower.contains("cable") {
        "cable_series"
    } else {
        "unknown"
    }
}

/// Sum of department totals; the metadata total is not trusted.
pub fn template_total(template: &BudgetTemplate) -> f64 {
    template.departments.iter().filter_map(|d| d.total).sum()
}

pub fn template_name(filename: &str) -> String {
    filename.replace(".pdf", "").replace('_', " ")
}

pub fn new_budget_template(
    template: &BudgetTemplate,
    fallback_filename: &str,
) -> Result<NewBudgetTemplate> {
    let filename = Some(template.metadata.filename.as_str())
        .filter(|f| !f.is_empty())
        .unwrap_or(fallback_filename)
        .to_string();
    Ok(NewBudgetTemplate {
        name: template_name(&filename),
        location: Some(location_name(template.metadata.location.as_deref())),
        production_type: production_type_for(&filename).to_string(),
        total_budget: template_total(template),
        shoot_days: template.metadata.shoot_days.map(|d| d as i32),
        shoot_dates: template.metadata.shoot_dates.clone(),
        template_data: serde_json::to_value(template).context("serializing template data")?,
        source_filename: filename,
        departments: template.departments.clone(),
    })
}

async fn load_one(store: &dyn CatalogStore, path: &Path, summary: &mut LoadSummary) -> Result<()> {
    let template: BudgetTemplate = read_json_file(path)?;
    let fallback = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let row = new_budget_template(&template, fallback)?;

    let existing = store
        .find_budget_template(&row.source_filename)
        .await
        .with_context(|| format!("looking up template {}", row.source_filename))?;
    if existing.is_some() {
        info!(template = %row.name, "template already loaded");
        summary.skipped += 1;
        return Ok(());
    }

    let id = store
        .insert_budget_template(&row)
        .await
        .with_context(|| format!("inserting template {}", row.name))?;
    info!(
        template = %row.name,
        %id,
        departments = row.department_count(),
        line_items = row.line_item_count(),
        "template loaded"
    );
    summary.inserted += 1;
    Ok(())
}

/// Load every template JSON in `dir`. A bad file is logged and counted as failed.
pub async fn load_budget_templates(store: &dyn CatalogStore, dir: &Path) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    for path in collect_files(dir, "json", false)? {
        if let Err(err) = load_one(store, &path, &mut summary).await {
            warn!(file = %path.display(), error = %format!("{err:#}"), "template load failed");
            summary.failed += 1;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_prefers_known_cities() {
        assert_eq!(location_name(Some("Atlanta, GA Shoot -15 Local Location Days")), "Atlanta");
        assert_eq!(location_name(Some("los angeles, ca")), "Los Angeles");
        assert_eq!(location_name(Some("Albuquerque, NM")), "Albuquerque");
        assert_eq!(location_name(Some("  ")), "Unknown");
        assert_eq!(location_name(None), "Unknown");
    }

    #[test]
    fn production_type_checks_in_priority_order() {
        assert_eq!(production_type_for("MultiCam_Pilot_Pattern.pdf"), "multi_cam");
        assert_eq!(production_type_for("Series_Pattern_Budget.pdf"), "pattern_budget");
        assert_eq!(production_type_for("Amort_Season_1.pdf"), "amortization");
        assert_eq!(production_type_for("Half_Hour_Pilot_Los_Angeles.pdf"), "one_hour_pilot");
        assert_eq!(production_type_for("Cable_Series.pdf"), "cable_series");
        assert_eq!(production_type_for("Feature.pdf"), "unknown");
    }

    #[test]
    fn name_drops_extension_and_underscores() {
        assert_eq!(template_name("Half_Hour_Pilot_Los_Angeles.pdf"), "Half Hour Pilot Los Angeles");
    }
}
