use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::RepairAggregate;

/// Number of entries kept in each ranked repair list.
pub const TOP_REPAIRS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAggregateEntry {
    pub label: String,
    pub count: u64,
    pub revenue: f64,
}

/// Repair-frequency and revenue statistics for one shop.
///
/// `most_common_repairs` and `high_value_repairs` are top-N views over the
/// same aggregate, which is kept alongside so that merging never loses
/// entries that fell outside either view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedStats {
    pub total_repair_orders: u64,
    pub total_revenue: f64,
    pub average_ro: f64,
    pub most_common_repairs: Vec<RepairAggregateEntry>,
    pub high_value_repairs: Vec<RepairAggregateEntry>,
    pub comeback_risks: Vec<ComebackRisk>,
    pub fleet_metrics: Vec<FleetMetric>,
    #[serde(skip)]
    pub(crate) repairs: RepairAggregate,
}

impl DerivedStats {
    pub fn empty() -> Self {
        RepairAggregate::default().into_stats()
    }

    pub fn repairs(&self) -> &RepairAggregate {
        &self.repairs
    }
}

pub fn average_ro(total_revenue: f64, total_repair_orders: u64) -> f64 {
    if total_repair_orders == 0 {
        0.0
    } else {
        total_revenue / total_repair_orders as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRepair {
    pub label: String,
    pub count: u64,
    pub revenue: f64,
    pub average_labor_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComebackRisk {
    pub label: String,
    pub count: u64,
    pub estimated_lost_hours: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetMetric {
    pub label: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuSuggestion {
    pub id: String,
    pub name: String,
    pub description: String,
    pub target_vehicle_ymm: Option<String>,
    pub estimated_labor_hours: Option<f64>,
    pub recommended_price: Option<f64>,
    pub based_on_jobs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionSuggestion {
    pub id: String,
    pub name: String,
    pub usage_context: Option<String>,
    pub note: Option<String>,
}

/// Finished analytics and suggestions for one shop. Built once per intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopHealthSnapshot {
    pub shop_id: Uuid,
    pub time_range_description: String,
    pub total_repair_orders: u64,
    pub total_revenue: f64,
    pub average_ro: f64,
    pub most_common_repairs: Vec<SnapshotRepair>,
    pub high_value_repairs: Vec<SnapshotRepair>,
    pub comeback_risks: Vec<ComebackRisk>,
    pub fleet_metrics: Vec<FleetMetric>,
    pub menu_suggestions: Vec<MenuSuggestion>,
    pub inspection_suggestions: Vec<InspectionSuggestion>,
    pub narrative_summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStatus {
    Pending,
    Completed,
}

impl IntakeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IntakeStatus::Pending => "pending",
            IntakeStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(IntakeStatus::Pending),
            "completed" => Some(IntakeStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Intake {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub status: IntakeStatus,
    pub customers_file_path: Option<String>,
    pub vehicles_file_path: Option<String>,
    pub parts_file_path: Option<String>,
    pub questionnaire: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Intake {
    /// File paths in download order: customers, vehicles, parts.
    pub fn file_paths(&self) -> [Option<&str>; 3] {
        [
            self.customers_file_path.as_deref(),
            self.vehicles_file_path.as_deref(),
            self.parts_file_path.as_deref(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TrainingEvent {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub payload: ShopHealthSnapshot,
    pub content: String,
}
