use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use reelrate_adapters::{
    extract_budget, read_json_file, BudgetParserConfig, LineRateExtractor, WgaScheduleExtractor,
};
use reelrate_core::{PageContent, RateType};
use reelrate_pipeline::{
    clean_rate_file, extract_rates_dir, extract_wga, import_rate_table, load_budget_templates,
    load_sideletters, load_tax_incentives, read_sideletters, tax_incentives_from_file,
    upload_cleaned_rates, upload_wga_rates, write_json_file, CleaningRules, LoadSummary, RateTable,
    UploadMode,
};
use reelrate_storage::{CatalogStore, MemoryCatalog};

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[tokio::test]
async fn contract_text_flows_through_cleaning_into_rate_cards() {
    let out = tempfile::tempdir().expect("tempdir");
    let summary = extract_rates_dir(
        &workspace_root().join("fixtures/contracts"),
        out.path(),
        &LineRateExtractor::default(),
    )
    .expect("extract");
    assert_eq!(summary.files, 2);
    assert_eq!(summary.per_union.get("IATSE Local 600"), Some(&6));
    assert!(out.path().join("IATSE_Local_600.json").exists());

    let cleaned = out.path().join("cleaned_rates.json");
    clean_rate_file(&out.path().join("all_rates.json"), &cleaned, &CleaningRules::default())
        .expect("clean");

    let store = MemoryCatalog::new();
    let first = upload_cleaned_rates(&store, &cleaned, UploadMode::SkipExisting)
        .await
        .expect("upload");
    assert!(first.inserted >= 6);
    assert_eq!(store.count_rate_cards(Some("IATSE Local 600")).await.expect("count"), 6);

    let again = upload_cleaned_rates(&store, &cleaned, UploadMode::SkipExisting)
        .await
        .expect("rerun");
    assert_eq!(again.inserted, 0);
    assert_eq!(again.skipped, again.total());

    let cards = store.rate_cards().await;
    let utility = cards
        .iter()
        .find(|c| c.job_classification == "Camera Utility")
        .expect("camera utility");
    assert_eq!(utility.rate_type, RateType::Hourly);
    assert_eq!(utility.effective_date, NaiveDate::from_ymd_opt(2024, 8, 4).expect("date"));
}

#[tokio::test]
async fn wga_schedule_uploads_once() {
    let out = tempfile::tempdir().expect("tempdir");
    let output = out.path().join("wga_rates.json");
    let batch = extract_wga(
        &workspace_root().join("fixtures/contracts/WGA/schedule_of_minimums.txt"),
        &output,
        &WgaScheduleExtractor::default(),
    )
    .expect("extract wga");
    assert_eq!(batch.rates.len(), 6);

    let store = MemoryCatalog::new();
    let fallback = NaiveDate::from_ymd_opt(2025, 5, 2).expect("date");
    let first = upload_wga_rates(&store, &output, fallback).await.expect("upload");
    assert_eq!(first.inserted, 6);
    let second = upload_wga_rates(&store, &output, fallback).await.expect("rerun");
    assert_eq!(second.skipped, 6);
    assert!(store
        .rate_cards()
        .await
        .iter()
        .all(|c| c.production_type.as_deref() == Some("theatrical")));
}

#[tokio::test]
async fn seeded_rate_table_links_rates_to_agreement() {
    let table = RateTable::load(workspace_root().join("seeds/iatse_local_705.yaml")).expect("seed");
    let store = MemoryCatalog::new();

    let import = import_rate_table(&store, &table).await.expect("import");
    assert!(import.agreement_created);
    assert_eq!(import.upload.inserted, table.rates.len());

    let rerun = import_rate_table(&store, &table).await.expect("rerun");
    assert_eq!(rerun.agreement_id, import.agreement_id);
    assert_eq!(rerun.upload.updated, table.rates.len());
    assert_eq!(store.agreements().await.len(), 1);
    assert_eq!(
        store.count_rate_cards(Some("IATSE Local 705")).await.expect("count"),
        table.rates.len() as i64
    );
}

#[tokio::test]
async fn sideletters_load_once() {
    let rules = read_sideletters(&workspace_root().join("fixtures/sideletters/hb_svod.yaml"))
        .expect("rules");
    let store = MemoryCatalog::new();

    let first = load_sideletters(&store, &rules).await.expect("load");
    assert_eq!(first, LoadSummary { inserted: 2, skipped: 0, failed: 0 });
    let second = load_sideletters(&store, &rules).await.expect("reload");
    assert_eq!(second, LoadSummary { inserted: 0, skipped: 2, failed: 0 });

    let stored = store.sideletters().await;
    let tier2 = stored.iter().find(|r| r.sideletter_name == "HB SVOD Tier 2").expect("tier 2");
    assert_eq!(tier2.vacation_pay_pct, 100.0);
    assert_eq!(tier2.max_budget_amount, None);
}

#[tokio::test]
async fn tax_incentives_skip_states_without_a_program() {
    let fixture = workspace_root().join("fixtures/tax/state_incentives.json");
    let (incentives, skipped) = tax_incentives_from_file(&fixture).expect("parse");
    assert_eq!(skipped, 1);
    assert_eq!(incentives.len(), 2);

    let georgia = &incentives[0];
    assert_eq!(georgia.country, "US");
    assert_eq!(georgia.incentive_max_percent, Some(30.0));
    assert_eq!(georgia.requirements, Some(serde_json::json!({"logo": true})));
    assert_eq!(georgia.source.as_deref(), Some("State film office program guides"));

    let new_mexico = &incentives[1];
    assert_eq!(new_mexico.non_resident_atl_percent, None);
    assert_eq!(new_mexico.requirements, None);
    let spend_uplifts = new_mexico.spend_uplifts.as_deref().expect("spend uplifts");
    let spend: serde_json::Value = serde_json::from_str(spend_uplifts).expect("json");
    assert_eq!(spend["rural"], 10);

    let store = MemoryCatalog::new();
    let first = load_tax_incentives(&store, &incentives).await.expect("load");
    assert_eq!(first.inserted, 2);
    let second = load_tax_incentives(&store, &incentives).await.expect("reload");
    assert_eq!(second.skipped, 2);
}

#[tokio::test]
async fn extracted_budget_loads_as_template() {
    let fixture = workspace_root().join("fixtures/budgets/Half_Hour_Pilot_Los_Angeles.pages.json");
    let pages: Vec<PageContent> = read_json_file(fixture).expect("pages fixture");
    let template =
        extract_budget(&pages, "Half_Hour_Pilot_Los_Angeles.pdf", BudgetParserConfig::default());

    let dir = tempfile::tempdir().expect("tempdir");
    write_json_file(&dir.path().join("Half_Hour_Pilot_Los_Angeles.json"), &template)
        .expect("write");
    fs::write(dir.path().join("broken.json"), "{ not json").expect("write");
    fs::write(dir.path().join("extraction_summary.csv"), "filename\n").expect("write");

    let store = MemoryCatalog::new();
    let summary = load_budget_templates(&store, dir.path()).await.expect("load");
    assert_eq!(summary, LoadSummary { inserted: 1, skipped: 0, failed: 1 });

    let stored = store.templates().await;
    let row = &stored[0];
    assert_eq!(row.name, "Half Hour Pilot Los Angeles");
    assert_eq!(row.location.as_deref(), Some("Los Angeles"));
    // The loader's filename ladder maps any "pilot" to one_hour_pilot; it has no half-hour type.
    assert_eq!(row.production_type, "one_hour_pilot");
    assert_eq!(row.total_budget, 90_300.0);
    assert_eq!(row.shoot_days, Some(20));
    assert_eq!(row.line_item_count(), 3);
    assert_eq!(row.template_data["metadata"]["filename"], "Half_Hour_Pilot_Los_Angeles.pdf");

    let rerun = load_budget_templates(&store, dir.path()).await.expect("reload");
    assert_eq!(rerun.skipped, 1);
}
