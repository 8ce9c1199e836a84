use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::aggregate::RepairAggregate;
use crate::models::{DerivedStats, Intake, IntakeStatus, ShopHealthSnapshot};
use crate::normalize::normalize_description;

pub const TRAINING_EVENT_TYPE: &str = "shop_boost_profile";

/// Relational store used by the pipeline.
#[async_trait]
pub trait ShopStore: Send + Sync {
    /// Most recent pending intake for the shop, if any.
    async fn pending_intake(&self, shop_id: Uuid) -> anyhow::Result<Option<Intake>>;

    /// Statistics from work orders already recorded for the shop.
    async fn shop_stats(&self, shop_id: Uuid) -> anyhow::Result<DerivedStats>;

    /// Stores the snapshot as the shop's current profile, replacing any
    /// earlier one.
    async fn upsert_profile(
        &self,
        shop_id: Uuid,
        intake_id: Uuid,
        snapshot: &ShopHealthSnapshot,
    ) -> anyhow::Result<()>;

    async fn insert_training_event(
        &self,
        shop_id: Uuid,
        payload: &ShopHealthSnapshot,
    ) -> anyhow::Result<Option<Uuid>>;

    async fn insert_training_document(
        &self,
        event_id: Uuid,
        shop_id: Uuid,
        content: &str,
    ) -> anyhow::Result<()>;

    async fn mark_intake_complete(&self, intake_id: Uuid) -> anyhow::Result<()>;
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShopStore for PgStore {
    async fn pending_intake(&self, shop_id: Uuid) -> anyhow::Result<Option<Intake>> {
        let row = sqlx::query(
            r#"
            SELECT id, shop_id, status, customers_file_path, vehicles_file_path,
                   parts_file_path, questionnaire, created_at
            FROM shop_boost.intakes
            WHERE shop_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up pending intake")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let questionnaire: Option<serde_json::Value> = row.get("questionnaire");
        let created_at: DateTime<Utc> = row.get("created_at");

        Ok(Some(Intake {
            id: row.get("id"),
            shop_id: row.get("shop_id"),
            status: IntakeStatus::parse(&status)
                .with_context(|| format!("unknown intake status {status:?}"))?,
            customers_file_path: row.get("customers_file_path"),
            vehicles_file_path: row.get("vehicles_file_path"),
            parts_file_path: row.get("parts_file_path"),
            questionnaire: questionnaire.unwrap_or(serde_json::Value::Null),
            created_at,
        }))
    }

    async fn shop_stats(&self, shop_id: Uuid) -> anyhow::Result<DerivedStats> {
        let rows = sqlx::query(
            r#"
            SELECT description,
                   COUNT(*) AS order_count,
                   COALESCE(SUM(total), 0)::DOUBLE PRECISION AS revenue
            FROM shop_boost.work_orders
            WHERE shop_id = $1
            GROUP BY description
            "#,
        )
        .bind(shop_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to aggregate recorded work orders")?;

        let mut aggregate = RepairAggregate::default();
        for row in rows {
            let description: Option<String> = row.get("description");
            let order_count: i64 = row.get("order_count");
            let revenue: f64 = row.get("revenue");
            let label = normalize_description(description.as_deref().unwrap_or_default());
            aggregate.record_many(&label, order_count.max(0) as u64, revenue.max(0.0));
        }

        Ok(aggregate.into_stats())
    }

    async fn upsert_profile(
        &self,
        shop_id: Uuid,
        intake_id: Uuid,
        snapshot: &ShopHealthSnapshot,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shop_boost.profiles (shop_id, intake_id, snapshot, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (shop_id) DO UPDATE
            SET intake_id = EXCLUDED.intake_id,
                snapshot = EXCLUDED.snapshot,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(shop_id)
        .bind(intake_id)
        .bind(Json(snapshot))
        .execute(&self.pool)
        .await
        .context("failed to upsert shop profile")?;
        Ok(())
    }

    async fn insert_training_event(
        &self,
        shop_id: Uuid,
        payload: &ShopHealthSnapshot,
    ) -> anyhow::Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            INSERT INTO shop_boost.training_events (id, shop_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(shop_id)
        .bind(TRAINING_EVENT_TYPE)
        .bind(Json(payload))
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert training event")?;

        Ok(row.map(|row| row.get("id")))
    }

    async fn insert_training_document(
        &self,
        event_id: Uuid,
        shop_id: Uuid,
        content: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shop_boost.training_documents (id, event_id, shop_id, content)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(shop_id)
        .bind(content)
        .execute(&self.pool)
        .await
        .context("failed to insert training document")?;
        Ok(())
    }

    async fn mark_intake_complete(&self, intake_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE shop_boost.intakes
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(intake_id)
        .execute(&self.pool)
        .await
        .context("failed to mark intake complete")?;
        Ok(())
    }
}

/// Loads recorded work orders from a CSV export. Rows already imported
/// (same `source_key`) are skipped; returns how many rows were new.
pub async fn import_work_orders(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        shop_id: Uuid,
        ro_number: String,
        description: String,
        total: f64,
        closed_on: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO shop_boost.work_orders
            (id, shop_id, ro_number, description, total, closed_on, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.shop_id)
        .bind(&row.ro_number)
        .bind(&row.description)
        .bind(row.total)
        .bind(row.closed_on)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
