use std::collections::HashSet;

use async_trait::async_trait;
use reelrate_core::{
    Agreement, RateCard, RateCardLookup, ReferenceDoc, SideletterRule, TaxIncentive,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{CatalogStore, NewBudgetTemplate, StorageError, UpsertOutcome};

#[derive(Debug, Default)]
struct MemoryState {
    rate_cards: Vec<RateCard>,
    agreements: Vec<Agreement>,
    sideletters: Vec<SideletterRule>,
    tax_incentives: Vec<(Uuid, TaxIncentive)>,
    templates: Vec<(Uuid, NewBudgetTemplate)>,
    reference_docs: Vec<ReferenceDoc>,
}

/// In-process catalog with the same key and upsert semantics as [`crate::PgCatalog`].
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
    rejected_classifications: HashSet<String>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate cards with this classification fail with a record-level error.
    pub fn rejecting_classification(mut self, classification: impl Into<String>) -> Self {
        self.rejected_classifications.insert(classification.into());
        self
    }

    pub async fn rate_cards(&self) -> Vec<RateCard> {
        self.state.lock().await.rate_cards.clone()
    }

    pub async fn agreements(&self) -> Vec<Agreement> {
        self.state.lock().await.agreements.clone()
    }

    pub async fn sideletters(&self) -> Vec<SideletterRule> {
        self.state.lock().await.sideletters.clone()
    }

    pub async fn tax_incentives(&self) -> Vec<TaxIncentive> {
        self.state
            .lock()
            .await
            .tax_incentives
            .iter()
            .map(|(_, incentive)| incentive.clone())
            .collect()
    }

    pub async fn templates(&self) -> Vec<NewBudgetTemplate> {
        self.state
            .lock()
            .await
            .templates
            .iter()
            .map(|(_, template)| template.clone())
            .collect()
    }

    pub async fn reference_docs(&self) -> Vec<ReferenceDoc> {
        self.state.lock().await.reference_docs.clone()
    }

    fn check_rejected(&self, card: &RateCard) -> Result<(), StorageError> {
        if self.rejected_classifications.contains(&card.job_classification) {
            return Err(StorageError::Record(format!(
                "classification {} rejected",
                card.job_classification
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_rate_card(&self, lookup: &RateCardLookup) -> Result<Option<Uuid>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .rate_cards
            .iter()
            .find(|card| lookup.matches(card))
            .map(|card| card.id))
    }

    async fn insert_rate_card(&self, card: &RateCard) -> Result<(), StorageError> {
        self.check_rejected(card)?;
        let mut state = self.state.lock().await;
        let key = card.key();
        if state.rate_cards.iter().any(|existing| existing.key() == key) {
            return Err(StorageError::Record(format!(
                "duplicate rate card {} / {}",
                card.union_local, card.job_classification
            )));
        }
        state.rate_cards.push(card.clone());
        Ok(())
    }

    async fn upsert_rate_card(&self, card: &RateCard) -> Result<UpsertOutcome, StorageError> {
        self.check_rejected(card)?;
        let mut state = self.state.lock().await;
        let key = card.key();
        match state.rate_cards.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => {
                existing.base_rate = card.base_rate;
                existing.agreement_id = card.agreement_id;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                state.rate_cards.push(card.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn count_rate_cards(&self, union_local: Option<&str>) -> Result<i64, StorageError> {
        let state = self.state.lock().await;
        let count = state
            .rate_cards
            .iter()
            .filter(|card| union_local.map_or(true, |u| card.union_local == u))
            .count();
        Ok(count as i64)
    }

    async fn find_agreement(
        &self,
        union_name: &str,
        short_name: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .agreements
            .iter()
            .find(|a| a.union_name == union_name && a.short_name == short_name)
            .map(|a| a.id))
    }

    async fn insert_agreement(&self, agreement: &Agreement) -> Result<Uuid, StorageError> {
        let mut state = self.state.lock().await;
        state.agreements.push(agreement.clone());
        Ok(agreement.id)
    }

    async fn find_sideletter(&self, name: &str) -> Result<Option<Uuid>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .sideletters
            .iter()
            .find(|rule| rule.sideletter_name == name)
            .map(|rule| rule.id))
    }

    async fn insert_sideletter(&self, rule: &SideletterRule) -> Result<(), StorageError> {
        self.state.lock().await.sideletters.push(rule.clone());
        Ok(())
    }

    async fn find_tax_incentive(&self, state_name: &str) -> Result<Option<Uuid>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .tax_incentives
            .iter()
            .find(|(_, incentive)| incentive.state == state_name)
            .map(|(id, _)| *id))
    }

    async fn insert_tax_incentive(&self, incentive: &TaxIncentive) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        self.state
            .lock()
            .await
            .tax_incentives
            .push((id, incentive.clone()));
        Ok(id)
    }

    async fn find_budget_template(
        &self,
        source_filename: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .templates
            .iter()
            .find(|(_, t)| t.source_filename == source_filename)
            .map(|(id, _)| *id))
    }

    async fn insert_budget_template(
        &self,
        template: &NewBudgetTemplate,
    ) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        self.state.lock().await.templates.push((id, template.clone()));
        Ok(id)
    }

    async fn delete_reference_docs(&self, doc_name: &str) -> Result<u64, StorageError> {
        let mut state = self.state.lock().await;
        let before = state.reference_docs.len();
        state.reference_docs.retain(|doc| doc.doc_name != doc_name);
        Ok((before - state.reference_docs.len()) as u64)
    }

    async fn insert_reference_doc(&self, doc: &ReferenceDoc) -> Result<(), StorageError> {
        self.state.lock().await.reference_docs.push(doc.clone());
        Ok(())
    }
}
