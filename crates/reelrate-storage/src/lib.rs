//! Persistence for reelrate: extracted-text artifacts on disk and the relational
//! catalog (rate cards, agreements, reference tables, budget templates).

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use reelrate_core::{
    Agreement, Department, RateCard, RateCardLookup, ReferenceDoc, SideletterRule, TaxIncentive,
};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

mod memory;
mod pg;

pub use memory::MemoryCatalog;
pub use pg::PgCatalog;

pub const CRATE_NAME: &str = "reelrate-storage";

#[derive(Debug, Clone)]
pub struct StoredText {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    /// True when the file was already on disk and left untouched.
    pub already_present: bool,
}

/// Write-once store for extracted contract text.
#[derive(Debug, Clone)]
pub struct TextArtifactStore {
    root: PathBuf,
}

impl TextArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub async fn exists(&self, relative_path: &Path) -> anyhow::Result<bool> {
        let path = self.root.join(relative_path);
        fs::try_exists(&path)
            .await
            .with_context(|| format!("checking text artifact {}", path.display()))
    }

    /// Write `text` at `relative_path` via temp file + rename. Existing files are
    /// never overwritten; their hash is reported instead.
    pub async fn store_text(&self, relative_path: &Path, text: &str) -> anyhow::Result<StoredText> {
        let absolute_path = self.root.join(relative_path);
        let parent = absolute_path
            .parent()
            .with_context(|| format!("text artifact {} has no parent", absolute_path.display()))?
            .to_path_buf();

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating text directory {}", parent.display()))?;

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking text artifact {}", absolute_path.display()))?
        {
            let existing = fs::read(&absolute_path)
                .await
                .with_context(|| format!("reading text artifact {}", absolute_path.display()))?;
            debug!(path = %absolute_path.display(), "text artifact already present");
            return Ok(StoredText {
                content_hash: Self::sha256_hex(&existing),
                relative_path: relative_path.to_path_buf(),
                absolute_path,
                byte_size: existing.len(),
                already_present: true,
            });
        }

        let bytes = text.as_bytes();
        let content_hash = Self::sha256_hex(bytes);
        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp text file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp text file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp text file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(StoredText {
                content_hash,
                relative_path: relative_path.to_path_buf(),
                absolute_path,
                byte_size: bytes.len(),
                already_present: false,
            }),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp text {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("record rejected: {0}")]
    Record(String),
}

impl StorageError {
    /// Connection-level failures abort a job; everything else is a per-record skip.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::Connection(err),
            other => StorageError::Query(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A budget template ready to be written with its departments and line items.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBudgetTemplate {
    pub name: String,
    pub location: Option<String>,
    pub production_type: String,
    pub total_budget: f64,
    pub shoot_days: Option<i32>,
    pub shoot_dates: Option<String>,
    pub template_data: JsonValue,
    pub source_filename: String,
    pub departments: Vec<Department>,
}

impl NewBudgetTemplate {
    pub fn department_count(&self) -> usize {
        self.departments.len()
    }

    pub fn line_item_count(&self) -> usize {
        self.departments.iter().map(|d| d.line_items.len()).sum()
    }
}

/// Seam between the import jobs and the relational store.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_rate_card(&self, lookup: &RateCardLookup) -> Result<Option<Uuid>, StorageError>;
    async fn insert_rate_card(&self, card: &RateCard) -> Result<(), StorageError>;
    /// Insert, or overwrite rate and agreement on a natural-key conflict.
    async fn upsert_rate_card(&self, card: &RateCard) -> Result<UpsertOutcome, StorageError>;
    async fn count_rate_cards(&self, union_local: Option<&str>) -> Result<i64, StorageError>;

    async fn find_agreement(
        &self,
        union_name: &str,
        short_name: &str,
    ) -> Result<Option<Uuid>, StorageError>;
    async fn insert_agreement(&self, agreement: &Agreement) -> Result<Uuid, StorageError>;

    async fn find_sideletter(&self, name: &str) -> Result<Option<Uuid>, StorageError>;
    async fn insert_sideletter(&self, rule: &SideletterRule) -> Result<(), StorageError>;

    async fn find_tax_incentive(&self, state: &str) -> Result<Option<Uuid>, StorageError>;
    async fn insert_tax_incentive(&self, incentive: &TaxIncentive) -> Result<Uuid, StorageError>;

    async fn find_budget_template(
        &self,
        source_filename: &str,
    ) -> Result<Option<Uuid>, StorageError>;
    /// Template, departments and line items are written atomically.
    async fn insert_budget_template(
        &self,
        template: &NewBudgetTemplate,
    ) -> Result<Uuid, StorageError>;

    async fn delete_reference_docs(&self, doc_name: &str) -> Result<u64, StorageError>;
    async fn insert_reference_doc(&self, doc: &ReferenceDoc) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn text_hashing_is_stable() {
        let hash = TextArtifactStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn existing_text_files_are_left_untouched() {
        let dir = tempdir().expect("tempdir");
        let store = TextArtifactStore::new(dir.path());
        let rel = Path::new("IATSE_Local_728").join("agreement.txt");

        let first = store.store_text(&rel, "first body").await.expect("first store");
        let second = store.store_text(&rel, "second body").await.expect("second store");

        assert!(!first.already_present);
        assert!(second.already_present);
        assert_eq!(first.content_hash, second.content_hash);
        let on_disk = std::fs::read_to_string(&first.absolute_path).expect("read back");
        assert_eq!(on_disk, "first body");
        assert!(store.exists(&rel).await.expect("exists"));
    }

    #[test]
    fn only_connection_failures_are_fatal() {
        assert!(StorageError::from(sqlx::Error::PoolTimedOut).is_connection_level());
        assert!(!StorageError::from(sqlx::Error::RowNotFound).is_connection_level());
        assert!(!StorageError::Record("bad row".into()).is_connection_level());
    }
}
