// SPDX-License-Identifier: PMPL-1.0-or-later
//! Runtime and filter-selectivity extraction.
//!
//! Reads the raw (uncanonicalized) tree: these are exactly the quantities
//! normalization throws away.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{value_kind, PlanDocument, PlanNode, ResolvedPlan};
use crate::error::{PlanError, PlanResult};

/// Top-level wall-clock execution time, in milliseconds.
pub const EXECUTION_TIME_KEY: &str = "Execution Time";
/// Per-node filter predicate text.
pub const FILTER_KEY: &str = "Filter";
/// Rows emitted by a node.
pub const ACTUAL_ROWS_KEY: &str = "Actual Rows";
/// Rows discarded by a node's filter.
pub const ROWS_REMOVED_KEY: &str = "Rows Removed by Filter";

/// Filter predicates and row totals across a whole plan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterStats {
    /// Predicate text of every filtering node, in pre-order.
    pub filters: Vec<String>,
    /// Sum of `Actual Rows` over filtering nodes.
    pub actual_rows: u64,
    /// Sum of `Rows Removed by Filter` over filtering nodes.
    pub rows_removed: u64,
    /// `actual_rows / (actual_rows + rows_removed)`; `None` when no rows
    /// passed through any filter, including when the plan has no filters.
    pub selectivity: Option<f64>,
}

impl FilterStats {
    pub fn from_totals(filters: Vec<String>, actual_rows: u64, rows_removed: u64) -> Self {
        // Summed as floats: the two totals may each be close to u64::MAX.
        let seen = actual_rows as f64 + rows_removed as f64;
        let selectivity = if seen == 0.0 {
            None
        } else {
            Some(actual_rows as f64 / seen)
        };
        Self {
            filters,
            actual_rows,
            rows_removed,
            selectivity,
        }
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }
}

/// Execution time of the run, in milliseconds.
///
/// Fails with [`PlanError::MissingField`] when the plan was not captured with
/// `ANALYZE`; never substitutes zero.
pub fn extract_runtime(document: &PlanDocument) -> PlanResult<f64> {
    let value = match document.resolve() {
        ResolvedPlan::Tree {
            envelope: Some(envelope),
            ..
        } => envelope.get(EXECUTION_TIME_KEY),
        ResolvedPlan::Tree { root, envelope: None } => root.attribute(EXECUTION_TIME_KEY),
        ResolvedPlan::RawText(_) => return Err(PlanError::UnstructuredPlan),
    };

    let value = value.ok_or_else(|| PlanError::MissingField(EXECUTION_TIME_KEY.to_string()))?;
    value.as_f64().ok_or_else(|| {
        PlanError::invalid_field(
            EXECUTION_TIME_KEY,
            format!("expected a number, found {}", value_kind(value)),
        )
    })
}

/// Walk every node and total up the filtering ones.
pub fn extract_filter_stats(document: &PlanDocument) -> PlanResult<FilterStats> {
    let root = match document.resolve() {
        ResolvedPlan::Tree { root, .. } => root,
        ResolvedPlan::RawText(_) => return Err(PlanError::UnstructuredPlan),
    };

    let mut totals = FilterTotals::default();
    totals.visit(root)?;
    Ok(FilterStats::from_totals(
        totals.filters,
        totals.actual_rows,
        totals.rows_removed,
    ))
}

/// `|a - b|`.
pub fn runtime_difference(a_ms: f64, b_ms: f64) -> f64 {
    (a_ms - b_ms).abs()
}

/// `|a - b|` when both selectivities are defined.
pub fn selectivity_difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a - b).abs()),
        _ => None,
    }
}

#[derive(Default)]
struct FilterTotals {
    filters: Vec<String>,
    actual_rows: u64,
    rows_removed: u64,
}

impl FilterTotals {
    fn visit(&mut self, node: &PlanNode) -> PlanResult<()> {
        if let Some(filter) = node.attribute(FILTER_KEY) {
            let text = filter.as_str().ok_or_else(|| {
                PlanError::invalid_field(
                    FILTER_KEY,
                    format!("expected text, found {}", value_kind(filter)),
                )
            })?;
            self.filters.push(text.to_string());
            self.actual_rows = add_rows(self.actual_rows, node, ACTUAL_ROWS_KEY)?;
            self.rows_removed = add_rows(self.rows_removed, node, ROWS_REMOVED_KEY)?;
        }

        for child in node.children() {
            self.visit(child)?;
        }
        Ok(())
    }
}

fn add_rows(total: u64, node: &PlanNode, key: &str) -> PlanResult<u64> {
    total
        .checked_add(row_count(node, key)?)
        .ok_or_else(|| PlanError::invalid_field(key, "row total overflows"))
}

// Absent counters (plain EXPLAIN) count as zero. PostgreSQL 18 reports
// per-loop averages with two decimals, which are rounded.
fn row_count(node: &PlanNode, key: &str) -> PlanResult<u64> {
    let Some(value) = node.attribute(key) else {
        return Ok(0);
    };
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Ok(f.round() as u64),
        _ => Err(PlanError::invalid_field(
            key,
            format!("expected a non-negative row count, found {}", describe(value)),
        )),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        other => value_kind(other).to_string(),
    }
}
