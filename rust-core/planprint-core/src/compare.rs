// SPDX-License-Identifier: PMPL-1.0-or-later
//! Run-to-run plan comparison.
//!
//! Composes canonicalization, fingerprinting and metrics extraction into one
//! [`ComparisonResult`] per pair of runs, and summarizes a run history.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::canonical::Canonicalizer;
use crate::config::{CanonicalStrategy, CanonicalizationConfig};
use crate::document::PlanDocument;
use crate::error::PlanResult;
use crate::fingerprint::{fingerprint, plans_match, Fingerprint};
use crate::metrics::{
    extract_filter_stats, extract_runtime, runtime_difference, selectivity_difference, FilterStats,
};

/// One materialized execution of a query.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRecord {
    /// Run label, typically the capture directory name.
    pub run_id: String,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    pub plan: PlanDocument,
    /// Metrics captured alongside the plan, carried verbatim.
    #[serde(default)]
    pub metrics: Option<Map<String, Value>>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, plan: PlanDocument) -> Self {
        Self {
            run_id: run_id.into(),
            captured_at: None,
            plan,
            metrics: None,
        }
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn with_metrics(mut self, metrics: Map<String, Value>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// A field of the separately captured metrics document.
    pub fn metric(&self, name: &str) -> Option<&Value> {
        self.metrics.as_ref().and_then(|m| m.get(name))
    }
}

/// Identity and statistics of a single plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProfile {
    pub fingerprint: Fingerprint,
    pub runtime_ms: f64,
    pub filters: FilterStats,
}

impl PlanProfile {
    /// Fingerprint `document` with `canonicalizer` and read its raw metrics.
    pub fn build(document: &PlanDocument, canonicalizer: &dyn Canonicalizer) -> PlanResult<Self> {
        let tree = canonicalizer.canonicalize(document)?;
        Ok(Self {
            fingerprint: fingerprint(&tree)?,
            runtime_ms: extract_runtime(document)?,
            filters: extract_filter_stats(document)?,
        })
    }
}

/// Outcome of comparing two plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub strategy: CanonicalStrategy,
    pub same_plan: bool,
    pub fingerprint_a: Fingerprint,
    pub fingerprint_b: Fingerprint,
    pub runtime_a_ms: f64,
    pub runtime_b_ms: f64,
    pub runtime_diff_ms: f64,
    pub filters_a: FilterStats,
    pub filters_b: FilterStats,
    /// `None` unless both plans have a defined selectivity.
    pub selectivity_diff: Option<f64>,
}

impl ComparisonResult {
    pub fn from_profiles(strategy: CanonicalStrategy, a: PlanProfile, b: PlanProfile) -> Self {
        let same_plan = plans_match(&a.fingerprint, &b.fingerprint);
        let runtime_diff_ms = runtime_difference(a.runtime_ms, b.runtime_ms);
        let selectivity_diff = selectivity_difference(a.filters.selectivity, b.filters.selectivity);

        debug!(
            strategy = %strategy,
            same_plan,
            fingerprint_a = %a.fingerprint.short(),
            fingerprint_b = %b.fingerprint.short(),
            runtime_diff_ms,
            selectivity_diff = ?selectivity_diff,
            "compared plans"
        );

        Self {
            strategy,
            same_plan,
            fingerprint_a: a.fingerprint,
            fingerprint_b: b.fingerprint,
            runtime_a_ms: a.runtime_ms,
            runtime_b_ms: b.runtime_ms,
            runtime_diff_ms,
            filters_a: a.filters,
            filters_b: b.filters,
            selectivity_diff,
        }
    }
}

/// Compare two plan documents under `config`.
pub fn compare(a: &PlanDocument, b: &PlanDocument, config: &CanonicalizationConfig) -> PlanResult<ComparisonResult> {
    let canonicalizer = config.canonicalizer();
    let profile_a = PlanProfile::build(a, canonicalizer.as_ref())?;
    let profile_b = PlanProfile::build(b, canonicalizer.as_ref())?;
    Ok(ComparisonResult::from_profiles(config.strategy, profile_a, profile_b))
}

/// A comparison tagged with the runs it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub run_a: String,
    pub run_b: String,
    #[serde(flatten)]
    pub result: ComparisonResult,
}

/// Compare two runs.
pub fn compare_runs(a: &RunRecord, b: &RunRecord, config: &CanonicalizationConfig) -> PlanResult<RunComparison> {
    Ok(RunComparison {
        run_a: a.run_id.clone(),
        run_b: b.run_id.clone(),
        result: compare(&a.plan, &b.plan, config)?,
    })
}

/// What a history knows about one run. The fingerprint is required; metrics
/// are absent for plain `EXPLAIN` and text captures.
#[derive(Debug, Clone, PartialEq)]
struct RunProfile {
    fingerprint: Fingerprint,
    runtime_ms: Option<f64>,
    filters: Option<FilterStats>,
}

impl RunProfile {
    fn build(run: &RunRecord, canonicalizer: &dyn Canonicalizer) -> PlanResult<Self> {
        let tree = canonicalizer.canonicalize(&run.plan)?;
        Ok(Self {
            fingerprint: fingerprint(&tree)?,
            runtime_ms: measured(&run.run_id, "runtime", extract_runtime(&run.plan)),
            filters: measured(&run.run_id, "filters", extract_filter_stats(&run.plan)),
        })
    }
}

fn measured<T>(run_id: &str, metric: &str, value: PlanResult<T>) -> Option<T> {
    match value {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(run_id, metric, error = %e, "run metric unavailable");
            None
        }
    }
}

/// One adjacent pair in a run history.
///
/// Plan identity is always present. Runtime and selectivity are reported
/// only when the runs carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStep {
    pub run_a: String,
    pub run_b: String,
    pub strategy: CanonicalStrategy,
    pub same_plan: bool,
    pub fingerprint_a: Fingerprint,
    pub fingerprint_b: Fingerprint,
    pub runtime_a_ms: Option<f64>,
    pub runtime_b_ms: Option<f64>,
    /// `None` unless both runs report a runtime.
    pub runtime_diff_ms: Option<f64>,
    /// `None` unless both runs have a defined selectivity.
    pub selectivity_diff: Option<f64>,
}

impl HistoryStep {
    fn from_profiles(
        strategy: CanonicalStrategy,
        (run_a, a): (&RunRecord, &RunProfile),
        (run_b, b): (&RunRecord, &RunProfile),
    ) -> Self {
        let runtime_diff_ms = match (a.runtime_ms, b.runtime_ms) {
            (Some(a), Some(b)) => Some(runtime_difference(a, b)),
            _ => None,
        };
        let selectivity = |p: &RunProfile| p.filters.as_ref().and_then(|f| f.selectivity);

        Self {
            run_a: run_a.run_id.clone(),
            run_b: run_b.run_id.clone(),
            strategy,
            same_plan: plans_match(&a.fingerprint, &b.fingerprint),
            fingerprint_a: a.fingerprint.clone(),
            fingerprint_b: b.fingerprint.clone(),
            runtime_a_ms: a.runtime_ms,
            runtime_b_ms: b.runtime_ms,
            runtime_diff_ms,
            selectivity_diff: selectivity_difference(selectivity(a), selectivity(b)),
        }
    }
}

/// Compare each run with the one after it, in the order given.
///
/// Every plan is canonicalized and measured once. A run whose metrics cannot
/// be read still takes part in plan identity; only canonicalization or
/// fingerprinting failures abort the history.
pub fn compare_consecutive(runs: &[RunRecord], config: &CanonicalizationConfig) -> PlanResult<Vec<HistoryStep>> {
    let canonicalizer = config.canonicalizer();
    let profiles = runs
        .iter()
        .map(|run| RunProfile::build(run, canonicalizer.as_ref()))
        .collect::<PlanResult<Vec<_>>>()?;

    Ok(runs
        .windows(2)
        .zip(profiles.windows(2))
        .map(|(pair, profile)| {
            HistoryStep::from_profiles(
                config.strategy,
                (&pair[0], &profile[0]),
                (&pair[1], &profile[1]),
            )
        })
        .collect())
}

/// Adjacent pair of runs whose plans differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChange {
    pub run_a: String,
    pub run_b: String,
    pub fingerprint_a: Fingerprint,
    pub fingerprint_b: Fingerprint,
}

/// Plan stability over a sequence of consecutive comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistorySummary {
    pub runs: usize,
    pub distinct_plans: usize,
    pub plan_changes: Vec<PlanChange>,
    /// Runs with no readable runtime, in history order.
    pub unmeasured_runs: Vec<String>,
}

impl HistorySummary {
    /// Every run used the same plan.
    pub fn is_stable(&self) -> bool {
        self.plan_changes.is_empty()
    }
}

/// Summarize the output of [`compare_consecutive`].
pub fn summarize(steps: &[HistoryStep]) -> HistorySummary {
    let mut distinct = BTreeSet::new();
    let mut plan_changes = Vec::new();
    let mut unmeasured_runs = Vec::new();

    if let Some(first) = steps.first() {
        if first.runtime_a_ms.is_none() {
            unmeasured_runs.push(first.run_a.clone());
        }
    }

    for step in steps {
        distinct.insert(&step.fingerprint_a);
        distinct.insert(&step.fingerprint_b);
        if step.runtime_b_ms.is_none() {
            unmeasured_runs.push(step.run_b.clone());
        }
        if !step.same_plan {
            plan_changes.push(PlanChange {
                run_a: step.run_a.clone(),
                run_b: step.run_b.clone(),
                fingerprint_a: step.fingerprint_a.clone(),
                fingerprint_b: step.fingerprint_b.clone(),
            });
        }
    }

    let summary = HistorySummary {
        runs: if steps.is_empty() { 0 } else { steps.len() + 1 },
        distinct_plans: distinct.len(),
        plan_changes,
        unmeasured_runs,
    };
    debug!(
        runs = summary.runs,
        distinct_plans = summary.distinct_plans,
        changes = summary.plan_changes.len(),
        unmeasured = summary.unmeasured_runs.len(),
        "summarized plan history"
    );
    summary
}
