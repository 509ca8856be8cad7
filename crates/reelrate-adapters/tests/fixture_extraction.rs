use std::fs;
use std::path::PathBuf;

use reelrate_adapters::budget::extract_metadata;
use reelrate_adapters::{extract_budget, extractor_for, read_json_file, BudgetParserConfig};
use reelrate_core::{PageContent, RateType};

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[test]
fn camera_schedule_fixture_extracts_expected_rates() {
    let path = workspace_root().join("fixtures/contracts/IATSE_Local_600/camera_wage_schedule.txt");
    let text = fs::read_to_string(&path).expect("fixture text");
    let extractor = extractor_for("v2").expect("standard extractor");

    let rates =
        extractor.dedupe(extractor.extract(&text, "IATSE_Local_600/camera_wage_schedule.txt"));
    let found: Vec<_> = rates
        .iter()
        .map(|r| {
            (
                r.occupation_code.as_str(),
                r.job_classification.as_str(),
                r.base_rate,
                r.rate_type,
            )
        })
        .collect();

    assert_eq!(
        found,
        vec![
            ("4101", "Director of Photography", 4816.63, RateType::Weekly),
            ("4110", "Camera Operator", 3335.48, RateType::Weekly),
            ("4120", "First Assistant Camera", 2598.21, RateType::Weekly),
            ("", "Digital Imaging Technician", 63.13, RateType::Hourly),
            ("", "Still Photographer, 1st 6 months", 2975.40, RateType::Weekly),
            ("", "Camera Utility", 38.5, RateType::Hourly),
        ]
    );
    assert!(rates.iter().all(|r| r.union_local == "IATSE Local 600"));
    assert!(rates.iter().all(|r| r.effective_period == "8/4/24-8/2/25"));
}

#[test]
fn wga_fixture_uses_the_schedule_extractor() {
    let path = workspace_root().join("fixtures/contracts/WGA/schedule_of_minimums.txt");
    let text = fs::read_to_string(&path).expect("fixture text");
    let extractor = extractor_for("wga").expect("wga extractor");

    let rates = extractor.dedupe(extractor.extract(&text, "WGA/schedule_of_minimums.txt"));
    assert_eq!(rates.len(), 6);
    assert!(rates.iter().all(|r| r.union_local == "WGA" && r.craft == "Writers"));
    assert_eq!(rates[5].job_classification, "Staff Writer (Week-to-Week)");
}

#[test]
fn budget_pages_fixture_yields_departments_and_totals() {
    let fixture = workspace_root().join("fixtures/budgets/Half_Hour_Pilot_Los_Angeles.pages.json");
    let pages: Vec<PageContent> = read_json_file(fixture).expect("pages fixture");

    let metadata = extract_metadata(&pages, "Half_Hour_Pilot_Los_Angeles.pdf");
    assert_eq!(metadata.location.as_deref(), Some("Los Angeles, CA"));
    assert_eq!(metadata.shoot_days, Some(20));
    assert_eq!(metadata.production_type.as_deref(), Some("half_hour_pilot"));
    assert_eq!(metadata.total_budget, Some(1_900_000.0));

    let template =
        extract_budget(&pages, "Half_Hour_Pilot_Los_Angeles.pdf", BudgetParserConfig::default());
    assert_eq!(template.extraction_stats.total_pages, 5);
    assert_eq!(template.extraction_stats.departments_found, 2);
    assert_eq!(template.extraction_stats.line_items_found, 3);

    let story = &template.departments[0];
    assert_eq!(story.name.as_deref(), Some("STORY & RIGHTS"));
    assert_eq!(story.total, Some(31_500.0));
    let writers = &story.line_items[0];
    assert_eq!(writers.periods.keys().collect::<Vec<_>>(), vec!["prep", "shoot"]);

    let staff = &template.departments[1];
    assert_eq!(staff.total, Some(58_800.0));
    let upm = &staff.line_items[0];
    assert_eq!(upm.position, "UPM");
    assert_eq!(upm.subtotal, Some(33_600.0));
    assert!(upm.periods.contains_key("wrap"));
    assert_eq!(staff.line_items[1].description, "Production Coordinator");
}
