use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregate::derive_file_stats;
use crate::db::ShopStore;
use crate::llm::CompletionClient;
use crate::merge::{merge, merge_all};
use crate::models::{DerivedStats, Intake, IntakeStatus, ShopHealthSnapshot};
use crate::storage::{bytes_to_text, ObjectStore};
use crate::synth::{synthesize_snapshot, SynthesisError};
use crate::training::record_training_event;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no pending intake for shop {shop_id}")]
    NoPendingIntake { shop_id: Uuid },
    #[error("intake {expected} was requested but the pending intake is {found}")]
    IntakeMismatch { expected: Uuid, found: Uuid },
    #[error("intake lookup failed: {0:#}")]
    Lookup(#[source] anyhow::Error),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

pub struct Pipeline {
    store: Arc<dyn ShopStore>,
    objects: Arc<dyn ObjectStore>,
    completions: Arc<dyn CompletionClient>,
    bucket: String,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ShopStore>,
        objects: Arc<dyn ObjectStore>,
        completions: Arc<dyn CompletionClient>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            objects,
            completions,
            bucket: bucket.into(),
        }
    }

    /// Runs the whole pipeline for one shop. Every failure is logged and
    /// turned into `None`; the intake stays pending in that case.
    pub async fn build_shop_boost_profile(
        &self,
        shop_id: Uuid,
        intake_id: Option<Uuid>,
    ) -> Option<ShopHealthSnapshot> {
        match self.try_build(shop_id, intake_id).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(%shop_id, error = %err, "no snapshot produced");
                None
            }
        }
    }

    pub async fn try_build(
        &self,
        shop_id: Uuid,
        intake_id: Option<Uuid>,
    ) -> Result<ShopHealthSnapshot, PipelineError> {
        let intake = self
            .store
            .pending_intake(shop_id)
            .await
            .map_err(PipelineError::Lookup)?
            .filter(|intake| intake.shop_id == shop_id && intake.status == IntakeStatus::Pending)
            .ok_or(PipelineError::NoPendingIntake { shop_id })?;

        if let Some(expected) = intake_id {
            if expected != intake.id {
                return Err(PipelineError::IntakeMismatch {
                    expected,
                    found: intake.id,
                });
            }
        }
        info!(
            %shop_id,
            intake_id = %intake.id,
            status = intake.status.as_str(),
            created_at = %intake.created_at,
            "building shop boost profile"
        );

        let csv_stats = self.intake_stats(&intake).await;
        if csv_stats.repairs().is_empty() {
            warn!(%shop_id, intake_id = %intake.id, "intake exports contained no repair rows");
        }
        let store_stats = match self.store.shop_stats(shop_id).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(%shop_id, error = %format!("{err:#}"), "recorded work order stats unavailable");
                DerivedStats::empty()
            }
        };
        let stats = merge(&csv_stats, &store_stats);
        info!(
            %shop_id,
            repair_orders = stats.total_repair_orders,
            revenue = stats.total_revenue,
            distinct_repairs = stats.repairs().len(),
            "merged shop statistics"
        );

        let snapshot =
            synthesize_snapshot(self.completions.as_ref(), shop_id, &intake.questionnaire, &stats)
                .await?;

        if let Err(err) = self
            .store
            .upsert_profile(shop_id, intake.id, &snapshot)
            .await
        {
            error!(%shop_id, error = %format!("{err:#}"), "failed to persist shop profile");
        }

        if let Some(event) = record_training_event(self.store.as_ref(), &snapshot).await {
            debug!(
                %shop_id,
                event_id = %event.id,
                event_shop_id = %event.shop_id,
                content_chars = event.content.len(),
                "training data stored"
            );
        }

        match self.store.mark_intake_complete(intake.id).await {
            Ok(()) => info!(%shop_id, intake_id = %intake.id, "intake completed"),
            Err(err) => error!(
                %shop_id,
                intake_id = %intake.id,
                error = %format!("{err:#}"),
                "failed to mark intake complete"
            ),
        }

        Ok(snapshot)
    }

    /// Downloads the intake's three exports concurrently and folds their
    /// statistics. A missing or failed file contributes nothing.
    async fn intake_stats(&self, intake: &Intake) -> DerivedStats {
        let [customers, vehicles, parts] = intake.file_paths();
        let (customers, vehicles, parts) = tokio::join!(
            self.download_text(customers),
            self.download_text(vehicles),
            self.download_text(parts),
        );

        let per_file: Vec<DerivedStats> = [customers, vehicles, parts]
            .into_iter()
            .flatten()
            .map(|text| derive_file_stats(&text))
            .collect();
        merge_all(&per_file)
    }

    async fn download_text(&self, path: Option<&str>) -> Option<String> {
        let path = path.filter(|path| !path.trim().is_empty())?;
        match self.objects.download(&self.bucket, path).await {
            Ok(bytes) => Some(bytes_to_text(&bytes)),
            Err(err) => {
                warn!(bucket = %self.bucket, %path, error = %format!("{err:#}"), "download failed; skipping file");
                None
            }
        }
    }
}
