//! Rate-card upload: skip-if-exists or upsert, with per-record failures counted.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reelrate_adapters::read_json_file;
use reelrate_core::{CleanRate, CleanedRateFile, RateBatch, RateCard, RawRate};
use reelrate_storage::{CatalogStore, StorageError, UpsertOutcome};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Insert unless a card with the same union, classification, type and rate exists.
    SkipExisting,
    /// As `SkipExisting`, but the existence check ignores the rate type.
    SkipExistingAnyType,
    /// Insert or overwrite rate and agreement on the natural key.
    Upsert,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl UploadSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }
}

enum CardOutcome {
    Inserted,
    Updated,
    Exists,
}

async fn upload_one(
    store: &dyn CatalogStore,
    card: &RateCard,
    mode: UploadMode,
) -> Result<CardOutcome, StorageError> {
    let lookup = match mode {
        UploadMode::Upsert => {
            return Ok(match store.upsert_rate_card(card).await? {
                UpsertOutcome::Inserted => CardOutcome::Inserted,
                UpsertOutcome::Updated => CardOutcome::Updated,
            });
        }
        UploadMode::SkipExisting => card.lookup(),
        UploadMode::SkipExistingAnyType => card.lookup().without_rate_type(),
    };

    if store.find_rate_card(&lookup).await?.is_some() {
        return Ok(CardOutcome::Exists);
    }
    store.insert_rate_card(card).await?;
    Ok(CardOutcome::Inserted)
}

/// Upload every card. Record-level failures are logged and counted as skipped;
/// a connection-level failure aborts the batch.
pub async fn upload_rate_cards(
    store: &dyn CatalogStore,
    cards: &[RateCard],
    mode: UploadMode,
) -> Result<UploadSummary> {
    let span = info_span!("upload_rate_cards", cards = cards.len(), ?mode);
    async move {
        let mut summary = UploadSummary::default();
        for card in cards {
            match upload_one(store, card, mode).await {
                Ok(CardOutcome::Inserted) => summary.inserted += 1,
                Ok(CardOutcome::Updated) => summary.updated += 1,
                Ok(CardOutcome::Exists) => summary.skipped += 1,
                Err(err) if err.is_connection_level() => {
                    return Err(err).context("rate card upload aborted");
                }
                Err(err) => {
                    warn!(
                        union = %card.union_local,
                        classification = %card.job_classification,
                        error = %err,
                        "rate card skipped"
                    );
                    summary.skipped += 1;
                }
            }
        }
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "rate card upload finished"
        );
        Ok(summary)
    }
    .instrument(span)
    .await
}

pub async fn upload_cleaned_rates(
    store: &dyn CatalogStore,
    path: &Path,
    mode: UploadMode,
) -> Result<UploadSummary> {
    let file: CleanedRateFile = read_json_file(path)?;
    let cards: Vec<RateCard> = file
        .rates
        .iter()
        .map(|rate| RateCard::from_clean(rate, None))
        .collect();
    upload_rate_cards(store, &cards, mode).await
}

pub const WGA_PRODUCTION_TYPE: &str = "theatrical";

/// WGA schedule rates bypass the cleaning bands: their period is an ISO date and
/// flat fees far exceed the crew wage range.
pub fn wga_clean_rates(rates: &[RawRate], fallback_date: NaiveDate) -> Vec<CleanRate> {
    rates
        .iter()
        .map(|rate| CleanRate {
            union_local: rate.union_local.clone(),
            job_classification: rate.job_classification.clone(),
            rate_type: rate.rate_type,
            base_rate: rate.base_rate,
            effective_date: NaiveDate::parse_from_str(&rate.effective_period, "%Y-%m-%d")
                .unwrap_or(fallback_date),
            location: None,
            production_type: Some(WGA_PRODUCTION_TYPE.to_string()),
        })
        .collect()
}

pub async fn upload_wga_rates(
    store: &dyn CatalogStore,
    path: &Path,
    fallback_date: NaiveDate,
) -> Result<UploadSummary> {
    let batch: RateBatch<RawRate> = read_json_file(path)?;
    let cards: Vec<RateCard> = wga_clean_rates(&batch.rates, fallback_date)
        .iter()
        .map(|rate| RateCard::from_clean(rate, None))
        .collect();
    upload_rate_cards(store, &cards, UploadMode::SkipExistingAnyType).await
}

#[cfg(test)]
mod tests {
    use reelrate_core::RateType;
    use reelrate_storage::MemoryCatalog;

    use super::*;

    fn card(title: &str, rate: f64, rate_type: RateType) -> RateCard {
        RateCard::from_clean(
            &CleanRate {
                union_local: "IATSE Local 600".to_string(),
                job_classification: title.to_string(),
                rate_type,
                base_rate: rate,
                effective_date: NaiveDate::from_ymd_opt(2024, 8, 4).expect("date"),
                location: None,
                production_type: Some("theatrical".to_string()),
            },
            None,
        )
    }

    #[tokio::test]
    async fn second_upload_skips_everything() {
        let store = MemoryCatalog::new();
        let cards = vec![
            card("Camera Operator", 3335.48, RateType::Weekly),
            card("Camera Utility", 38.5, RateType::Hourly),
        ];

        let first = upload_rate_cards(&store, &cards, UploadMode::SkipExisting)
            .await
            .expect("upload");
        assert_eq!(first, UploadSummary { inserted: 2, updated: 0, skipped: 0 });

        let second = upload_rate_cards(&store, &cards, UploadMode::SkipExisting)
            .await
            .expect("upload");
        assert_eq!(second, UploadSummary { inserted: 0, updated: 0, skipped: 2 });
        assert_eq!(store.count_rate_cards(None).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn any_type_lookup_ignores_rate_type() {
        let store = MemoryCatalog::new();
        let seed = [card("Staff Writer", 5200.0, RateType::Weekly)];
        upload_rate_cards(&store, &seed, UploadMode::SkipExisting)
            .await
            .expect("seed");

        let retyped = [card("Staff Writer", 5200.0, RateType::Flat)];
        let strict = upload_rate_cards(&MemoryCatalog::new(), &retyped, UploadMode::SkipExisting)
            .await
            .expect("upload");
        assert_eq!(strict.inserted, 1);
        let loose = upload_rate_cards(&store, &retyped, UploadMode::SkipExistingAnyType)
            .await
            .expect("upload");
        assert_eq!(loose.skipped, 1);
    }

    #[tokio::test]
    async fn record_failures_are_counted_not_fatal() {
        let store = MemoryCatalog::new().rejecting_classification("Camera Utility");
        let cards = vec![
            card("Camera Utility", 38.5, RateType::Hourly),
            card("Camera Operator", 3335.48, RateType::Weekly),
        ];
        let summary = upload_rate_cards(&store, &cards, UploadMode::SkipExisting)
            .await
            .expect("upload");
        assert_eq!(summary, UploadSummary { inserted: 1, updated: 0, skipped: 1 });
    }

    #[tokio::test]
    async fn upsert_reports_updates() {
        let store = MemoryCatalog::new();
        let original = [card("Camera Operator", 3000.0, RateType::Weekly)];
        upload_rate_cards(&store, &original, UploadMode::Upsert)
            .await
            .expect("first");
        let revised = [card("Camera Operator", 3335.48, RateType::Weekly)];
        let summary = upload_rate_cards(&store, &revised, UploadMode::Upsert)
            .await
            .expect("second");
        assert_eq!(summary, UploadSummary { inserted: 0, updated: 1, skipped: 0 });
        assert_eq!(store.rate_cards().await[0].base_rate, 3335.48);
    }

    #[test]
    fn wga_rates_use_their_iso_period() {
        let raw = RawRate {
            union_local: "WGA".to_string(),
            craft: "Writers".to_string(),
            job_classification: "Rewrite (High Budget)".to_string(),
            occupation_code: String::new(),
            base_rate: 60000.0,
            rate_type: RateType::Flat,
            effective_period: "2025-05-02".to_string(),
            section: None,
            source_file: "WGA/schedule.txt".to_string(),
        };
        let fallback = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let clean = wga_clean_rates(&[raw.clone()], fallback);
        assert_eq!(clean[0].effective_date, NaiveDate::from_ymd_opt(2025, 5, 2).expect("date"));
        assert_eq!(clean[0].production_type.as_deref(), Some("theatrical"));

        let undated = RawRate { effective_period: String::new(), ..raw };
        assert_eq!(wga_clean_rates(&[undated], fallback)[0].effective_date, fallback);
    }
}
