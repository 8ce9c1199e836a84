use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::{CompletionClient, CompletionRequest};
use crate::models::{
    ComebackRisk, DerivedStats, FleetMetric, InspectionSuggestion, MenuSuggestion,
    RepairAggregateEntry, ShopHealthSnapshot, SnapshotRepair,
};

/// Id used in the example shape. A suggestion that comes back with this id
/// (or none at all) has not been given a real one yet.
pub const PLACEHOLDER_ID: &str = "REPLACE_WITH_UUID";

pub const DEFAULT_TIME_RANGE: &str = "All imported history";

const SUGGESTION_LISTS: [&str; 2] = ["menuSuggestions", "inspectionSuggestions"];

const SYSTEM_PROMPT: &str = "You are a service-department analyst for independent auto repair \
shops. You read a shop's repair-order statistics and the owner's questionnaire answers, then \
produce a concise health snapshot with menu and inspection suggestions the shop can configure. \
Respond with a single JSON object and nothing else.";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("failed to serialize prompt input: {0}")]
    Prompt(#[source] serde_json::Error),
    #[error("completion request failed: {0:#}")]
    Completion(#[source] anyhow::Error),
    #[error("completion service returned no content")]
    EmptyResponse,
    #[error("completion was not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("completion JSON was not an object")]
    NotAnObject,
}

/// Example response; every suggestion id is [`PLACEHOLDER_ID`].
pub fn example_shape() -> Value {
    json!({
        "shopId": "00000000-0000-0000-0000-000000000000",
        "timeRangeDescription": "Last 12 months of imported repair orders",
        "totalRepairOrders": 1250,
        "totalRevenue": 487500.0,
        "averageRo": 390.0,
        "mostCommonRepairs": [
            { "label": "Oil change", "count": 410, "revenue": 32800.0, "averageLaborHours": 0.5 }
        ],
        "highValueRepairs": [
            { "label": "Timing belt replacement", "count": 18, "revenue": 21600.0, "averageLaborHours": 4.5 }
        ],
        "comebackRisks": [
            { "label": "Check engine light diagnosis", "count": 6, "estimatedLostHours": 4.0, "note": "Repeat visits within 30 days" }
        ],
        "fleetMetrics": [
            { "label": "Fleet share of revenue", "value": 22.5, "unit": "percent", "note": "Two local delivery fleets" }
        ],
        "menuSuggestions": [
            {
                "id": PLACEHOLDER_ID,
                "name": "Brake Safety Package",
                "description": "Pads, rotor resurfacing and brake fluid flush at a fixed price",
                "targetVehicleYmm": "2015-2020 Honda Accord",
                "estimatedLaborHours": 2.5,
                "recommendedPrice": 449.0,
                "basedOnJobs": ["Brake pad replacement", "Brake fluid flush"]
            }
        ],
        "inspectionSuggestions": [
            {
                "id": PLACEHOLDER_ID,
                "name": "Cooling system check",
                "usageContext": "Any vehicle over 75k miles in for routine service",
                "note": "Coolant flushes are under-sold relative to vehicle mix"
            }
        ],
        "narrativeSummary": "Two or three sentences on what the numbers say about the shop."
    })
}

pub fn build_request(
    questionnaire: &Value,
    stats: &DerivedStats,
) -> Result<CompletionRequest, SynthesisError> {
    let shape = serde_json::to_string_pretty(&example_shape()).map_err(SynthesisError::Prompt)?;
    let questionnaire =
        serde_json::to_string_pretty(questionnaire).map_err(SynthesisError::Prompt)?;
    let stats = serde_json::to_string_pretty(stats).map_err(SynthesisError::Prompt)?;

    let prompt = format!(
        "Build a shop health snapshot from the data below.\n\n\
         Respond with JSON matching this shape exactly (same keys, same nesting):\n{shape}\n\n\
         Leave every suggestion \"id\" set to \"{PLACEHOLDER_ID}\". Base repair lists and totals \
         on the statistics, and tailor menu and inspection suggestions to the questionnaire.\n\n\
         Questionnaire answers:\n{questionnaire}\n\n\
         Repair statistics:\n{stats}\n"
    );

    Ok(CompletionRequest::new(SYSTEM_PROMPT, &prompt))
}

/// Removes surrounding whitespace and one Markdown code fence, if present.
pub fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // drop an info string such as `json` on the opening fence line
    match rest.split_once('\n') {
        Some((info, inner)) if !info.trim_start().starts_with('{') => inner.trim(),
        _ => rest.trim(),
    }
}

fn needs_new_id(id: Option<&Value>) -> bool {
    match id {
        None | Some(Value::Null) => true,
        Some(Value::String(id)) => id.trim().is_empty() || id == PLACEHOLDER_ID,
        Some(Value::Number(_)) => false,
        Some(_) => true,
    }
}

/// Gives every suggestion with a missing, placeholder or non-scalar id a
/// fresh UUID; string and numeric ids are left as the model returned them.
pub fn reconcile_ids(snapshot: &mut Map<String, Value>) {
    for list in SUGGESTION_LISTS {
        let Some(Value::Array(entries)) = snapshot.get_mut(list) else {
            continue;
        };
        for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
            if needs_new_id(entry.get("id")) {
                entry.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
            }
        }
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite()),
        _ => None,
    }
}

fn count(value: &Value, key: &str) -> Option<u64> {
    number(value, key).filter(|v| *v >= 0.0).map(|v| v.round() as u64)
}

fn list<'a>(value: &'a Value, key: &str) -> Option<&'a [Value]> {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice)
}

fn strings(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn repair(value: &Value) -> Option<SnapshotRepair> {
    Some(SnapshotRepair {
        label: text(value, "label")?,
        count: count(value, "count").unwrap_or(0),
        revenue: number(value, "revenue").unwrap_or(0.0),
        average_labor_hours: number(value, "averageLaborHours"),
    })
}

fn from_stats(entries: &[RepairAggregateEntry]) -> Vec<SnapshotRepair> {
    entries
        .iter()
        .map(|entry| SnapshotRepair {
            label: entry.label.clone(),
            count: entry.count,
            revenue: entry.revenue,
            average_labor_hours: None,
        })
        .collect()
}

fn repairs(value: &Value, key: &str, fallback: &[RepairAggregateEntry]) -> Vec<SnapshotRepair> {
    match list(value, key) {
        Some(items) => items.iter().filter_map(repair).collect(),
        None => from_stats(fallback),
    }
}

fn comeback_risk(value: &Value) -> Option<ComebackRisk> {
    Some(ComebackRisk {
        label: text(value, "label")?,
        count: count(value, "count").unwrap_or(0),
        estimated_lost_hours: number(value, "estimatedLostHours"),
        note: text(value, "note"),
    })
}

fn fleet_metric(value: &Value) -> Option<FleetMetric> {
    Some(FleetMetric {
        label: text(value, "label")?,
        value: number(value, "value"),
        unit: text(value, "unit"),
        note: text(value, "note"),
    })
}

fn menu_suggestion(value: &Value) -> Option<MenuSuggestion> {
    Some(MenuSuggestion {
        id: text(value, "id")?,
        name: text(value, "name")?,
        description: text(value, "description").unwrap_or_default(),
        target_vehicle_ymm: text(value, "targetVehicleYmm"),
        estimated_labor_hours: number(value, "estimatedLaborHours"),
        recommended_price: number(value, "recommendedPrice"),
        based_on_jobs: strings(value, "basedOnJobs"),
    })
}

fn inspection_suggestion(value: &Value) -> Option<InspectionSuggestion> {
    Some(InspectionSuggestion {
        id: text(value, "id")?,
        name: text(value, "name")?,
        usage_context: text(value, "usageContext"),
        note: text(value, "note"),
    })
}

fn collect<T>(value: &Value, key: &str, coerce: fn(&Value) -> Option<T>) -> Vec<T> {
    list(value, key)
        .map(|items| items.iter().filter_map(coerce).collect())
        .unwrap_or_default()
}

/// Parses and validates a completion body. The model's `shopId` is never
/// trusted; the caller's id is always used.
pub fn parse_snapshot(
    shop_id: Uuid,
    body: &str,
    stats: &DerivedStats,
) -> Result<ShopHealthSnapshot, SynthesisError> {
    let parsed: Value =
        serde_json::from_str(strip_code_fence(body)).map_err(SynthesisError::InvalidJson)?;
    let Value::Object(mut object) = parsed else {
        return Err(SynthesisError::NotAnObject);
    };

    object.insert("shopId".to_string(), json!(shop_id));
    reconcile_ids(&mut object);
    let value = Value::Object(object);

    Ok(ShopHealthSnapshot {
        shop_id,
        time_range_description: text(&value, "timeRangeDescription")
            .unwrap_or_else(|| DEFAULT_TIME_RANGE.to_string()),
        total_repair_orders: count(&value, "totalRepairOrders")
            .unwrap_or(stats.total_repair_orders),
        total_revenue: number(&value, "totalRevenue").unwrap_or(stats.total_revenue),
        average_ro: number(&value, "averageRo").unwrap_or(stats.average_ro),
        most_common_repairs: repairs(&value, "mostCommonRepairs", &stats.most_common_repairs),
        high_value_repairs: repairs(&value, "highValueRepairs", &stats.high_value_repairs),
        comeback_risks: collect(&value, "comebackRisks", comeback_risk),
        fleet_metrics: collect(&value, "fleetMetrics", fleet_metric),
        menu_suggestions: collect(&value, "menuSuggestions", menu_suggestion),
        inspection_suggestions: collect(&value, "inspectionSuggestions", inspection_suggestion),
        narrative_summary: text(&value, "narrativeSummary").unwrap_or_default(),
    })
}

/// Calls the completion service once. Any failure is logged and returned;
/// no partial snapshot is ever produced.
pub async fn synthesize_snapshot(
    client: &dyn CompletionClient,
    shop_id: Uuid,
    questionnaire: &Value,
    stats: &DerivedStats,
) -> Result<ShopHealthSnapshot, SynthesisError> {
    let request = build_request(questionnaire, stats)?;

    let result = match client.complete(request).await {
        Ok(Some(body)) => parse_snapshot(shop_id, &body, stats),
        Ok(None) => Err(SynthesisError::EmptyResponse),
        Err(err) => Err(SynthesisError::Completion(err)),
    };

    match &result {
        Ok(snapshot) => info!(
            %shop_id,
            menu_suggestions = snapshot.menu_suggestions.len(),
            inspection_suggestions = snapshot.inspection_suggestions.len(),
            "synthesized shop health snapshot"
        ),
        Err(err) => warn!(%shop_id, error = %err, "snapshot synthesis failed"),
    }

    result
}
