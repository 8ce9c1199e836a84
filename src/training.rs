use std::fmt::Write;

use tracing::{error, info, warn};

use crate::db::ShopStore;
use crate::models::{ShopHealthSnapshot, SnapshotRepair, TrainingEvent};

fn write_repairs(output: &mut String, heading: &str, repairs: &[SnapshotRepair]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {heading}");

    if repairs.is_empty() {
        let _ = writeln!(output, "None recorded.");
        return;
    }

    for repair in repairs {
        let _ = write!(
            output,
            "- {}: {} orders, ${:.2} revenue",
            repair.label, repair.count, repair.revenue
        );
        if let Some(hours) = repair.average_labor_hours {
            let _ = write!(output, ", {hours:.1} avg labor hours");
        }
        let _ = writeln!(output);
    }
}

/// Plain-text rendering of a snapshot, stored next to the training event.
pub fn render_training_text(snapshot: &ShopHealthSnapshot) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Shop Health Snapshot");
    let _ = writeln!(
        output,
        "Shop {} ({})",
        snapshot.shop_id, snapshot.time_range_description
    );
    let _ = writeln!(
        output,
        "{} repair orders, ${:.2} revenue, ${:.2} average RO",
        snapshot.total_repair_orders, snapshot.total_revenue, snapshot.average_ro
    );

    write_repairs(&mut output, "Most Common Repairs", &snapshot.most_common_repairs);
    write_repairs(&mut output, "High Value Repairs", &snapshot.high_value_repairs);

    if !snapshot.comeback_risks.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Comeback Risks");
        for risk in &snapshot.comeback_risks {
            let _ = writeln!(
                output,
                "- {}: {} comebacks{}",
                risk.label,
                risk.count,
                risk.note
                    .as_deref()
                    .map(|note| format!(" ({note})"))
                    .unwrap_or_default()
            );
        }
    }

    if !snapshot.fleet_metrics.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Fleet Metrics");
        for metric in &snapshot.fleet_metrics {
            let value = metric
                .value
                .map(|value| value.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            let unit = metric.unit.as_deref().unwrap_or("");
            let _ = writeln!(output, "- {}: {} {}", metric.label, value, unit.trim());
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Menu Suggestions");
    if snapshot.menu_suggestions.is_empty() {
        let _ = writeln!(output, "None suggested.");
    } else {
        for menu in &snapshot.menu_suggestions {
            let _ = write!(output, "- {}: {}", menu.name, menu.description);
            if let Some(price) = menu.recommended_price {
                let _ = write!(output, " (${price:.2})");
            }
            if let Some(ymm) = &menu.target_vehicle_ymm {
                let _ = write!(output, " for {ymm}");
            }
            if !menu.based_on_jobs.is_empty() {
                let _ = write!(output, "; based on {}", menu.based_on_jobs.join(", "));
            }
            let _ = writeln!(output);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Inspection Suggestions");
    if snapshot.inspection_suggestions.is_empty() {
        let _ = writeln!(output, "None suggested.");
    } else {
        for inspection in &snapshot.inspection_suggestions {
            let _ = write!(output, "- {}", inspection.name);
            if let Some(context) = &inspection.usage_context {
                let _ = write!(output, ": {context}");
            }
            let _ = writeln!(output);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "{}", snapshot.narrative_summary);

    output
}

/// Stores the snapshot as a training event and, once that row exists, the
/// text rendering linked to it. Failures are logged, never returned.
pub async fn record_training_event(
    store: &dyn ShopStore,
    snapshot: &ShopHealthSnapshot,
) -> Option<TrainingEvent> {
    let shop_id = snapshot.shop_id;

    let event_id = match store.insert_training_event(shop_id, snapshot).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!(%shop_id, "training event insert returned no id");
            return None;
        }
        Err(err) => {
            error!(%shop_id, error = %format!("{err:#}"), "failed to record training event");
            return None;
        }
    };

    let content = render_training_text(snapshot);
    if let Err(err) = store
        .insert_training_document(event_id, shop_id, &content)
        .await
    {
        error!(%shop_id, %event_id, error = %format!("{err:#}"), "failed to record training document");
        return None;
    }

    info!(%shop_id, %event_id, "recorded training event");
    Some(TrainingEvent {
        id: event_id,
        shop_id,
        payload: snapshot.clone(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DerivedStats, InspectionSuggestion, Intake, MenuSuggestion};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    enum EventOutcome {
        Id(Uuid),
        NoId,
    }

    struct TrainingStore {
        event: EventOutcome,
        fail_document: bool,
        documents: Mutex<Vec<(Uuid, String)>>,
    }

    impl TrainingStore {
        fn new(event: EventOutcome, fail_document: bool) -> Self {
            Self {
                event,
                fail_document,
                documents: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ShopStore for TrainingStore {
        async fn pending_intake(&self, _shop_id: Uuid) -> anyhow::Result<Option<Intake>> {
            unreachable!("not used by training")
        }

        async fn shop_stats(&self, _shop_id: Uuid) -> anyhow::Result<DerivedStats> {
            unreachable!("not used by training")
        }

        async fn upsert_profile(
            &self,
            _shop_id: Uuid,
            _intake_id: Uuid,
            _snapshot: &ShopHealthSnapshot,
        ) -> anyhow::Result<()> {
            unreachable!("not used by training")
        }

        async fn insert_training_event(
            &self,
            _shop_id: Uuid,
            _payload: &ShopHealthSnapshot,
        ) -> anyhow::Result<Option<Uuid>> {
            Ok(match self.event {
                EventOutcome::Id(id) => Some(id),
                EventOutcome::NoId => None,
            })
        }

        async fn insert_training_document(
            &self,
            event_id: Uuid,
            _shop_id: Uuid,
            content: &str,
        ) -> anyhow::Result<()> {
            self.documents
                .lock()
                .unwrap()
                .push((event_id, content.to_string()));
            if self.fail_document {
                return Err(anyhow!("documents table unavailable"));
            }
            Ok(())
        }

        async fn mark_intake_complete(&self, _intake_id: Uuid) -> anyhow::Result<()> {
            unreachable!("not used by training")
        }
    }

    fn sample_snapshot() -> ShopHealthSnapshot {
        ShopHealthSnapshot {
            shop_id: Uuid::nil(),
            time_range_description: "2025".to_string(),
            total_repair_orders: 4,
            total_revenue: 1000.0,
            average_ro: 250.0,
            most_common_repairs: vec![SnapshotRepair {
                label: "Oil change".to_string(),
                count: 3,
                revenue: 180.0,
                average_labor_hours: Some(0.5),
            }],
            high_value_repairs: Vec::new(),
            comeback_risks: Vec::new(),
            fleet_metrics: Vec::new(),
            menu_suggestions: vec![MenuSuggestion {
                id: "m-1".to_string(),
                name: "Oil Club".to_string(),
                description: "Prepaid oil changes".to_string(),
                target_vehicle_ymm: None,
                estimated_labor_hours: None,
                recommended_price: Some(199.0),
                based_on_jobs: vec!["Oil change".to_string()],
            }],
            inspection_suggestions: vec![InspectionSuggestion {
                id: "i-1".to_string(),
                name: "Tire tread check".to_string(),
                usage_context: Some("every oil change".to_string()),
                note: None,
            }],
            narrative_summary: "Steady maintenance shop.".to_string(),
        }
    }

    #[test]
    fn renders_every_section() {
        let text = render_training_text(&sample_snapshot());
        assert!(text.starts_with("# Shop Health Snapshot\n"));
        assert!(text.contains("4 repair orders, $1000.00 revenue, $250.00 average RO"));
        assert!(text.contains("- Oil change: 3 orders, $180.00 revenue, 0.5 avg labor hours"));
        assert!(text.contains("## High Value Repairs\nNone recorded."));
        assert!(text.contains("- Oil Club: Prepaid oil changes ($199.00); based on Oil change"));
        assert!(text.contains("- Tire tread check: every oil change"));
        assert!(text.trim_end().ends_with("Steady maintenance shop."));
        assert!(!text.contains("## Fleet Metrics"));
    }

    #[tokio::test]
    async fn document_is_linked_to_the_new_event() {
        let event_id = Uuid::new_v4();
        let store = TrainingStore::new(EventOutcome::Id(event_id), false);
        let event = record_training_event(&store, &sample_snapshot()).await.unwrap();

        assert_eq!(event.id, event_id);
        assert_eq!(event.payload, sample_snapshot());
        let documents = store.documents.lock().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].0, event_id);
        assert_eq!(documents[0].1, event.content);
    }

    #[tokio::test]
    async fn event_without_id_skips_the_document() {
        let store = TrainingStore::new(EventOutcome::NoId, false);
        assert!(record_training_event(&store, &sample_snapshot()).await.is_none());
        assert!(store.documents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn document_failure_is_swallowed() {
        let store = TrainingStore::new(EventOutcome::Id(Uuid::new_v4()), true);
        assert!(record_training_event(&store, &sample_snapshot()).await.is_none());
        assert_eq!(store.documents.lock().unwrap().len(), 1);
    }
}
