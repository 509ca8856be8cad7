//! Curated rate tables: YAML files naming an agreement and its rates, imported with
//! upsert semantics so a re-run refreshes amounts in place.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reelrate_core::{Agreement, CleanRate, RateCard, RateType};
use reelrate_storage::CatalogStore;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use crate::upload::{upload_rate_cards, UploadMode, UploadSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementRecord {
    pub name: String,
    pub short_name: String,
    pub union_name: String,
    #[serde(default)]
    pub effective_start: Option<NaiveDate>,
    #[serde(default)]
    pub effective_end: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl AgreementRecord {
    fn to_agreement(&self) -> Agreement {
        Agreement {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            short_name: self.short_name.clone(),
            union_name: self.union_name.clone(),
            effective_start: self.effective_start,
            effective_end: self.effective_end,
            description: self.description.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTableEntry {
    pub position: String,
    pub rate: f64,
    pub rate_type: RateType,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub production_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub agreement: AgreementRecord,
    /// Union local written on every rate card; usually the agreement's union.
    pub union_local: String,
    pub effective_date: NaiveDate,
    pub rates: Vec<RateTableEntry>,
}

impl RateTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn rate_cards(&self, agreement_id: Uuid) -> Vec<RateCard> {
        self.rates
            .iter()
            .map(|entry| {
                let rate = CleanRate {
                    union_local: self.union_local.clone(),
                    job_classification: entry.position.clone(),
                    rate_type: entry.rate_type,
                    base_rate: entry.rate,
                    effective_date: self.effective_date,
                    location: entry.location.clone(),
                    production_type: entry.production_type.clone(),
                };
                RateCard::from_clean(&rate, Some(agreement_id))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateTableImport {
    pub agreement_id: Uuid,
    pub agreement_created: bool,
    pub upload: UploadSummary,
}

/// Find or create the table's agreement, then upsert every rate linked to it.
pub async fn import_rate_table(
    store: &dyn CatalogStore,
    table: &RateTable,
) -> Result<RateTableImport> {
    let agreement = &table.agreement;
    let existing = store
        .find_agreement(&agreement.union_name, &agreement.short_name)
        .await
        .with_context(|| {
            format!("looking up agreement {} {}", agreement.union_name, agreement.short_name)
        })?;

    let (agreement_id, agreement_created) = match existing {
        Some(id) => {
            info!(agreement = %agreement.name, %id, "agreement already exists");
            (id, false)
        }
        None => {
            let id = store
                .insert_agreement(&agreement.to_agreement())
                .await
                .with_context(|| format!("creating agreement {}", agreement.name))?;
            info!(agreement = %agreement.name, %id, "created agreement");
            (id, true)
        }
    };

    let cards = table.rate_cards(agreement_id);
    let upload = upload_rate_cards(store, &cards, UploadMode::Upsert).await?;
    Ok(RateTableImport {
        agreement_id,
        agreement_created,
        upload,
    })
}

#[cfg(test)]
mod tests {
    use reelrate_storage::MemoryCatalog;

    use super::*;

    const TABLE: &str = r#"
agreement:
  name: DGA High Budget SVOD Agreement 2023
  short_name: HBSVOD
  union_name: DGA
  effective_start: 2023-07-01
  effective_end: 2026-06-30
  metadata:
    type: hbsvod
union_local: DGA
effective_date: 2024-07-01
rates:
  - position: Director - HBSVOD One-Hour
    rate: 68893
    rate_type: program
    production_type: hbsvod
  - position: First Assistant Director - HBSVOD
    rate: 6676
    rate_type: weekly
    production_type: hbsvod
    location: Studio
"#;

    #[tokio::test]
    async fn rerun_reuses_agreement_and_updates_rates() {
        let store = MemoryCatalog::new();
        let mut table: RateTable = serde_yaml::from_str(TABLE).expect("table");

        let first = import_rate_table(&store, &table).await.expect("first import");
        assert!(first.agreement_created);
        assert_eq!(first.upload.inserted, 2);

        table.rates[1].rate = 6800.0;
        let second = import_rate_table(&store, &table).await.expect("second import");
        assert!(!second.agreement_created);
        assert_eq!(second.agreement_id, first.agreement_id);
        assert_eq!(second.upload.updated, 2);

        let cards = store.rate_cards().await;
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().all(|c| c.agreement_id == Some(first.agreement_id)));
        assert_eq!(cards[1].base_rate, 6800.0);
        assert_eq!(cards[0].rate_type, RateType::Program);
        assert_eq!(store.agreements().await[0].metadata["type"], "hbsvod");
    }
}
