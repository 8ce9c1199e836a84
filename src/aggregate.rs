use std::collections::BTreeMap;

use crate::classify::{self, ColumnChoice};
use crate::decode::{self, RawRow};
use crate::models::{average_ro, DerivedStats, RepairAggregateEntry, TOP_REPAIRS};
use crate::normalize::{label_key, normalize_description, GENERAL_REPAIR};

/// Frequency and revenue per repair label, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairAggregate {
    entries: BTreeMap<String, RepairAggregateEntry>,
    total_repair_orders: u64,
    total_revenue: f64,
}

impl RepairAggregate {
    /// Adds a single repair order.
    pub fn record(&mut self, label: &str, revenue: f64) {
        self.record_many(label, 1, revenue);
    }

    /// Adds `count` repair orders sharing one label and a summed revenue.
    pub fn record_many(&mut self, label: &str, count: u64, revenue: f64) {
        if count == 0 {
            return;
        }
        self.total_repair_orders += count;
        self.total_revenue += revenue;

        let entry = self
            .entries
            .entry(label_key(label))
            .or_insert_with(|| RepairAggregateEntry {
                label: label.to_string(),
                count: 0,
                revenue: 0.0,
            });
        entry.count += count;
        entry.revenue += revenue;
    }

    /// Folds `other` into `self`. When both sides carry the same key the
    /// lexicographically smaller display label is kept, so the result does
    /// not depend on argument order.
    pub fn absorb(&mut self, other: &RepairAggregate) {
        self.total_repair_orders += other.total_repair_orders;
        self.total_revenue += other.total_revenue;

        for (key, incoming) in &other.entries {
            match self.entries.get_mut(key) {
                Some(existing) => {
                    existing.count += incoming.count;
                    existing.revenue += incoming.revenue;
                    if incoming.label < existing.label {
                        existing.label = incoming.label.clone();
                    }
                }
                None => {
                    self.entries.insert(key.clone(), incoming.clone());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<&RepairAggregateEntry> {
        self.entries.get(&label_key(label))
    }

    fn ranked_by<F>(&self, compare: F) -> Vec<RepairAggregateEntry>
    where
        F: Fn(&RepairAggregateEntry, &RepairAggregateEntry) -> std::cmp::Ordering,
    {
        // BTreeMap order is key order, and the sort is stable, so equal
        // entries stay ordered by key.
        let mut ranked: Vec<RepairAggregateEntry> = self.entries.values().cloned().collect();
        ranked.sort_by(|a, b| compare(a, b));
        ranked.truncate(TOP_REPAIRS);
        ranked
    }

    pub fn into_stats(self) -> DerivedStats {
        let most_common_repairs = self.ranked_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.revenue.total_cmp(&a.revenue))
        });
        let high_value_repairs = self.ranked_by(|a, b| {
            b.revenue
                .total_cmp(&a.revenue)
                .then_with(|| b.count.cmp(&a.count))
        });

        DerivedStats {
            total_repair_orders: self.total_repair_orders,
            total_revenue: self.total_revenue,
            average_ro: average_ro(self.total_revenue, self.total_repair_orders),
            most_common_repairs,
            high_value_repairs,
            comeback_risks: Vec::new(),
            fleet_metrics: Vec::new(),
            repairs: self,
        }
    }
}

/// Keeps digits and `.` only, then parses; anything unparsable is zero.
pub fn parse_amount(raw: &str) -> f64 {
    let digits: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    digits
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Aggregates every data row (the first row is the header).
pub fn aggregate_rows(rows: &[RawRow], columns: ColumnChoice) -> RepairAggregate {
    let mut aggregate = RepairAggregate::default();

    for row in rows.iter().skip(1) {
        let label = columns
            .description
            .and_then(|index| row.get(index))
            .map(|cell| normalize_description(cell))
            .unwrap_or_else(|| GENERAL_REPAIR.to_string());
        let revenue = columns
            .total
            .and_then(|index| row.get(index))
            .map(|cell| parse_amount(cell))
            .unwrap_or(0.0);

        aggregate.record(&label, revenue);
    }

    aggregate
}

/// Decode, classify and aggregate one exported file.
pub fn derive_file_stats(text: &str) -> DerivedStats {
    let rows = decode::decode_text(text);
    let Some(header) = rows.first() else {
        return DerivedStats::empty();
    };
    let columns = classify::classify_columns(header);
    tracing::debug!(
        description_column = ?columns.description,
        total_column = ?columns.total,
        rows = rows.len().saturating_sub(1),
        "classified export columns"
    );
    aggregate_rows(&rows, columns).into_stats()
}
