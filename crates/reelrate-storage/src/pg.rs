use async_trait::async_trait;
use reelrate_core::{
    Agreement, RateCard, RateCardLookup, ReferenceDoc, SideletterRule, TaxIncentive,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{CatalogStore, NewBudgetTemplate, StorageError, UpsertOutcome};

const INSERT_RATE_CARD_SQL: &str = r#"
    INSERT INTO rate_cards (
        id, union_local, job_classification, rate_type, base_rate,
        location, production_type, effective_date, agreement_id
    ) VALUES ($1, $2, $3, $4, $5::float8::numeric, $6, $7, $8, $9)
"#;

/// Serialises upserts of one classification so the lookup and insert cannot race.
const LOCK_RATE_CARD_KEY_SQL: &str =
    "SELECT pg_advisory_xact_lock(hashtext($1::text || '/' || $2::text))";

/// Natural-key lookup. A NULL location or production type matches NULL, which a
/// unique index with `ON CONFLICT` would not.
const FIND_RATE_CARD_KEY_SQL: &str = r#"
    SELECT id
    FROM rate_cards
    WHERE union_local = $1
      AND job_classification = $2
      AND location IS NOT DISTINCT FROM $3
      AND production_type IS NOT DISTINCT FROM $4
      AND effective_date = $5
    LIMIT 1
    FOR UPDATE
"#;

const UPDATE_RATE_CARD_SQL: &str =
    "UPDATE rate_cards SET base_rate = $2::float8::numeric, agreement_id = $3 WHERE id = $1";

/// Postgres-backed catalog. The schema is owned elsewhere; this only reads and writes rows.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(StorageError::Connection)?;
        info!(max_connections, "connected to catalog database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn find_rate_card(&self, lookup: &RateCardLookup) -> Result<Option<Uuid>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id
            FROM rate_cards
            WHERE union_local = $1
              AND job_classification = $2
              AND ($3::text IS NULL OR rate_type = $3)
              AND base_rate = $4::float8::numeric
            LIMIT 1
            "#,
        )
        .bind(&lookup.union_local)
        .bind(&lookup.job_classification)
        .bind(lookup.rate_type.map(|rt| rt.as_str()))
        .bind(lookup.base_rate)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get::<Uuid, _>("id"))
            .transpose()
            .map_err(StorageError::from)
    }

    async fn insert_rate_card(&self, card: &RateCard) -> Result<(), StorageError> {
        sqlx::query(INSERT_RATE_CARD_SQL)
            .bind(card.id)
            .bind(&card.union_local)
            .bind(&card.job_classification)
            .bind(card.rate_type.as_str())
            .bind(card.base_rate)
            .bind(&card.location)
            .bind(&card.production_type)
            .bind(card.effective_date)
            .bind(card.agreement_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_rate_card(&self, card: &RateCard) -> Result<UpsertOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(LOCK_RATE_CARD_KEY_SQL)
            .bind(&card.union_local)
            .bind(&card.job_classification)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query(FIND_RATE_CARD_KEY_SQL)
            .bind(&card.union_local)
            .bind(&card.job_classification)
            .bind(&card.location)
            .bind(&card.production_type)
            .bind(card.effective_date)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing {
            Some(row) => {
                let id: Uuid = row.try_get("id")?;
                sqlx::query(UPDATE_RATE_CARD_SQL)
                    .bind(id)
                    .bind(card.base_rate)
                    .bind(card.agreement_id)
                    .execute(&mut *tx)
                    .await?;
                UpsertOutcome::Updated
            }
            None => {
                sqlx::query(INSERT_RATE_CARD_SQL)
                    .bind(card.id)
                    .bind(&card.union_local)
                    .bind(&card.job_classification)
                    .bind(card.rate_type.as_str())
                    .bind(card.base_rate)
                    .bind(&card.location)
                    .bind(&card.production_type)
                    .bind(card.effective_date)
                    .bind(card.agreement_id)
                    .execute(&mut *tx)
                    .await?;
                UpsertOutcome::Inserted
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn count_rate_cards(&self, union_local: Option<&str>) -> Result<i64, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM rate_cards WHERE ($1::text IS NULL OR union_local = $1)",
        )
        .bind(union_local)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }

    async fn find_agreement(
        &self,
        union_name: &str,
        short_name: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let row = sqlx::query("SELECT id FROM agreements WHERE short_name = $1 AND union_name = $2")
            .bind(short_name)
            .bind(union_name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<Uuid, _>("id"))
            .transpose()
            .map_err(StorageError::from)
    }

    async fn insert_agreement(&self, agreement: &Agreement) -> Result<Uuid, StorageError> {
        let row = sqlx::query(
            r#"
            INSERT INTO agreements (
                id, name, short_name, union_name, effective_start, effective_end,
                description, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(agreement.id)
        .bind(&agreement.name)
        .bind(&agreement.short_name)
        .bind(&agreement.union_name)
        .bind(agreement.effective_start)
        .bind(agreement.effective_end)
        .bind(&agreement.description)
        .bind(&agreement.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn find_sideletter(&self, name: &str) -> Result<Option<Uuid>, StorageError> {
        let row = sqlx::query("SELECT id FROM sideletter_rules WHERE sideletter_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<Uuid, _>("id"))
            .transpose()
            .map_err(StorageError::from)
    }

    async fn insert_sideletter(&self, rule: &SideletterRule) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO sideletter_rules (
                id, sideletter_name, production_type, distribution_platform,
                min_budget_amount, max_budget_amount,
                wage_adjustment_pct, holiday_pay_pct, vacation_pay_pct,
                applies_when, applicable_unions
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.sideletter_name)
        .bind(&rule.production_type)
        .bind(&rule.distribution_platform)
        .bind(rule.min_budget_amount)
        .bind(rule.max_budget_amount)
        .bind(rule.wage_adjustment_pct)
        .bind(rule.holiday_pay_pct)
        .bind(rule.vacation_pay_pct)
        .bind(&rule.applies_when)
        .bind(&rule.applicable_unions)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_tax_incentive(&self, state: &str) -> Result<Option<Uuid>, StorageError> {
        let row = sqlx::query("SELECT id FROM tax_incentives WHERE state = $1 LIMIT 1")
            .bind(state)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<Uuid, _>("id"))
            .transpose()
            .map_err(StorageError::from)
    }

    async fn insert_tax_incentive(&self, incentive: &TaxIncentive) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO tax_incentives (
                id, state, country,
                incentive_min_percent, incentive_max_percent, incentive_type, incentive_mechanism,
                resident_atl_percent, resident_btl_percent,
                non_resident_atl_percent, non_resident_btl_percent,
                qualified_spend_percent, minimum_spend, project_cap, annual_cap, compensation_cap,
                labor_uplifts, spend_uplifts, requirements, source, extracted_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
            )
            "#,
        )
        .bind(id)
        .bind(&incentive.state)
        .bind(&incentive.country)
        .bind(incentive.incentive_min_percent)
        .bind(incentive.incentive_max_percent)
        .bind(&incentive.incentive_type)
        .bind(&incentive.incentive_mechanism)
        .bind(incentive.resident_atl_percent)
        .bind(incentive.resident_btl_percent)
        .bind(incentive.non_resident_atl_percent)
        .bind(incentive.non_resident_btl_percent)
        .bind(incentive.qualified_spend_percent)
        .bind(incentive.minimum_spend)
        .bind(incentive.project_cap)
        .bind(incentive.annual_cap)
        .bind(incentive.compensation_cap)
        .bind(&incentive.labor_uplifts)
        .bind(&incentive.spend_uplifts)
        .bind(&incentive.requirements)
        .bind(&incentive.source)
        .bind(&incentive.extracted_at)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_budget_template(
        &self,
        source_filename: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let row = sqlx::query("SELECT id FROM budget_templates WHERE source_filename = $1 LIMIT 1")
            .bind(source_filename)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<Uuid, _>("id"))
            .transpose()
            .map_err(StorageError::from)
    }

    async fn insert_budget_template(
        &self,
        template: &NewBudgetTemplate,
    ) -> Result<Uuid, StorageError> {
        let template_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO budget_templates (
                id, name, location, production_type,
                total_budget, shoot_days, shoot_dates,
                template_data, source_filename,
                department_count, line_item_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(template_id)
        .bind(&template.name)
        .bind(&template.location)
        .bind(&template.production_type)
        .bind(template.total_budget)
        .bind(template.shoot_days)
        .bind(&template.shoot_dates)
        .bind(&template.template_data)
        .bind(&template.source_filename)
        .bind(template.department_count() as i32)
        .bind(template.line_item_count() as i32)
        .execute(&mut *tx)
        .await?;

        for (dept_order, dept) in template.departments.iter().enumerate() {
            let department_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO template_departments (id, template_id, name, account, total, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(department_id)
            .bind(template_id)
            .bind(&dept.name)
            .bind(&dept.account)
            .bind(dept.total)
            .bind(dept_order as i32)
            .execute(&mut *tx)
            .await?;

            for (item_order, item) in dept.line_items.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO template_line_items (
                        id, template_id, department_id,
                        account, description, position,
                        quantity, unit, rate, subtotal, total,
                        detail_lines, periods, sort_order
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(template_id)
                .bind(department_id)
                .bind(&item.account)
                .bind(&item.description)
                .bind(&item.position)
                .bind(item.quantity)
                .bind(&item.unit)
                .bind(item.rate)
                .bind(item.subtotal)
                .bind(item.total)
                .bind(json!(item.detail_lines))
                .bind(json!(item.periods))
                .bind(item_order as i32)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(%template_id, source = %template.source_filename, "budget template committed");
        Ok(template_id)
    }

    async fn delete_reference_docs(&self, doc_name: &str) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM reference_docs WHERE doc_name = $1")
            .bind(doc_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_reference_doc(&self, doc: &ReferenceDoc) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO reference_docs (
                id, doc_name, doc_type, source, section,
                page_start, page_end, content, summary, topics
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(doc.id)
        .bind(&doc.doc_name)
        .bind(&doc.doc_type)
        .bind(&doc.source)
        .bind(&doc.section)
        .bind(doc.page_start)
        .bind(doc.page_end)
        .bind(&doc.content)
        .bind(&doc.summary)
        .bind(&doc.topics)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_lookup_treats_null_columns_as_equal() {
        let sql = FIND_RATE_CARD_KEY_SQL.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(sql.contains("location IS NOT DISTINCT FROM $3"));
        assert!(sql.contains("production_type IS NOT DISTINCT FROM $4"));
        assert!(!sql.contains("location = $3"));
    }
}
