// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan normalizer.
//!
//! Strips run-variant telemetry (timings, costs, buffer counters, worker
//! bookkeeping) from every node so that two executions of the same strategy
//! produce the same canonical tree. Children are never reordered.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::{CanonicalTree, Canonicalizer, NormalizedNode};
use crate::config::CanonicalStrategy;
use crate::document::{PlanDocument, PlanNode, ResolvedPlan, NODE_TYPE_KEY};
use crate::error::PlanResult;

/// Fields that describe one execution rather than the plan itself.
const POSTGRES_NOISE_FIELDS: &[&str] = &[
    // execution / timing
    "Actual Startup Time",
    "Actual Total Time",
    "Actual Rows",
    "Actual Loops",
    "Execution Time",
    "Planning Time",
    // cost estimates
    "Startup Cost",
    "Total Cost",
    "Plan Rows",
    "Plan Width",
    // buffers / IO
    "Shared Hit Blocks",
    "Shared Read Blocks",
    "Shared Dirtied Blocks",
    "Shared Written Blocks",
    "Local Hit Blocks",
    "Local Read Blocks",
    "Local Dirtied Blocks",
    "Local Written Blocks",
    "Temp Read Blocks",
    "Temp Written Blocks",
    "I/O Read Time",
    "I/O Write Time",
    "Shared I/O Read Time",
    "Shared I/O Write Time",
    "Local I/O Read Time",
    "Local I/O Write Time",
    "Temp I/O Read Time",
    "Temp I/O Write Time",
    "WAL Records",
    "WAL FPI",
    "WAL Bytes",
    // parallel / runtime
    "Workers",
    "Workers Planned",
    "Workers Launched",
    "Peak Memory Usage",
    "Disk Usage",
    "HashAgg Batches",
    "Batches",
    "Planned Partitions",
    "Sort Method",
    "Sort Space Used",
    "Sort Space Type",
    "Hash Buckets",
    "Original Hash Buckets",
    "Hash Batches",
    "Original Hash Batches",
    "Heap Fetches",
    "Exact Heap Blocks",
    "Lossy Heap Blocks",
    "Rows Removed by Index Recheck",
    // misc
    "Async Capable",
    "Parent Relationship",
];

/// Predicate text and the counters tied to it. Stripped only when
/// [`NormalizerPolicy::strip_filters`] is set.
const POSTGRES_FILTER_FIELDS: &[&str] = &[
    "Filter",
    "Join Filter",
    "Rows Removed by Filter",
    "Rows Removed by Join Filter",
];

/// Which attributes the normalizer drops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerPolicy {
    /// Always removed, at every depth.
    pub deny_list: BTreeSet<String>,
    /// Removed only when `strip_filters` is set.
    pub filter_fields: BTreeSet<String>,
    /// Drop filter predicates and their row counters. Predicate text embeds
    /// parameter literals, which differ between runs of the same plan.
    pub strip_filters: bool,
}

impl NormalizerPolicy {
    /// Deny-list for PostgreSQL `EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON)` output.
    pub fn postgres() -> Self {
        Self {
            deny_list: POSTGRES_NOISE_FIELDS.iter().map(|s| s.to_string()).collect(),
            filter_fields: POSTGRES_FILTER_FIELDS.iter().map(|s| s.to_string()).collect(),
            strip_filters: true,
        }
    }

    /// Same policy, but filter predicates take part in plan identity.
    pub fn preserving_filters(mut self) -> Self {
        self.strip_filters = false;
        self
    }

    /// Add a field to the deny-list.
    pub fn deny(mut self, field: impl Into<String>) -> Self {
        self.deny_list.insert(field.into());
        self
    }

    pub fn is_denied(&self, field: &str) -> bool {
        self.deny_list.contains(field) || (self.strip_filters && self.filter_fields.contains(field))
    }
}

impl Default for NormalizerPolicy {
    fn default() -> Self {
        Self::postgres()
    }
}

/// Field deny-list canonicalizer.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    policy: NormalizerPolicy,
}

impl Normalizer {
    pub fn new(policy: NormalizerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &NormalizerPolicy {
        &self.policy
    }

    /// Normalize a decoded document.
    pub fn normalize(&self, document: &PlanDocument) -> CanonicalTree {
        normalize(document, &self.policy)
    }

    /// Normalize one subtree.
    pub fn normalize_node(&self, node: &PlanNode) -> NormalizedNode {
        normalize_node(node, &self.policy)
    }
}

impl Canonicalizer for Normalizer {
    fn strategy(&self) -> CanonicalStrategy {
        CanonicalStrategy::Normalize
    }

    fn canonicalize(&self, document: &PlanDocument) -> PlanResult<CanonicalTree> {
        Ok(self.normalize(document))
    }
}

/// Normalize `document` under `policy`.
pub fn normalize(document: &PlanDocument, policy: &NormalizerPolicy) -> CanonicalTree {
    match document.resolve() {
        ResolvedPlan::Tree { root, .. } => CanonicalTree::Normalized(normalize_node(root, policy)),
        ResolvedPlan::RawText(text) => CanonicalTree::RawText(text.to_string()),
    }
}

fn normalize_node(node: &PlanNode, policy: &NormalizerPolicy) -> NormalizedNode {
    let mut attributes = Map::new();
    attributes.insert(
        NODE_TYPE_KEY.to_string(),
        Value::String(node.node_type().to_string()),
    );

    for (key, value) in node.attributes() {
        if policy.is_denied(key) {
            continue;
        }
        attributes.insert(key.clone(), unify_booleans(value));
    }

    NormalizedNode {
        attributes,
        children: node
            .children()
            .iter()
            .map(|child| normalize_node(child, policy))
            .collect(),
    }
}

// The same flag arrives as `true` or `"true"` depending on the capture path.
fn unify_booleans(value: &Value) -> Value {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        Value::Array(items) => Value::Array(items.iter().map(unify_booleans).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), unify_booleans(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> PlanDocument {
        PlanDocument::from_value(&value).unwrap()
    }

    fn normalized_value(value: Value, policy: &NormalizerPolicy) -> Value {
        normalize(&doc(value), policy).to_value()
    }

    #[test]
    fn test_strips_noise_at_every_depth() {
        let out = normalized_value(
            json!([{
                "Plan": {
                    "Node Type": "Sort",
                    "Startup Cost": 10.0,
                    "Total Cost": 11.0,
                    "Actual Rows": 4,
                    "Sort Key": ["l_returnflag"],
                    "Plans": [{
                        "Node Type": "Seq Scan",
                        "Parent Relationship": "Outer",
                        "Relation Name": "lineitem",
                        "Shared Hit Blocks": 120,
                        "Async Capable": false
                    }]
                },
                "Planning Time": 0.3,
                "Execution Time": 12.0
            }]),
            &NormalizerPolicy::default(),
        );

        assert_eq!(
            out,
            json!({
                "Node Type": "Sort",
                "Sort Key": ["l_returnflag"],
                "Plans": [{ "Node Type": "Seq Scan", "Relation Name": "lineitem" }]
            })
        );
    }

    #[test]
    fn test_filter_flag_controls_predicates() {
        let plan = json!({
            "Node Type": "Seq Scan",
            "Relation Name": "lineitem",
            "Filter": "(l_shipdate <= '1998-09-02'::date)",
            "Rows Removed by Filter": 30000
        });

        let stripped = normalized_value(plan.clone(), &NormalizerPolicy::postgres());
        assert!(stripped.get("Filter").is_none());
        assert!(stripped.get("Rows Removed by Filter").is_none());

        let kept = normalized_value(plan, &NormalizerPolicy::postgres().preserving_filters());
        assert_eq!(kept["Filter"], json!("(l_shipdate <= '1998-09-02'::date)"));
        assert_eq!(kept["Rows Removed by Filter"], json!(30000));
    }

    #[test]
    fn test_boolean_strings_unified() {
        let native = normalized_value(
            json!({ "Node Type": "Aggregate", "Partial Mode": "Simple", "Parallel Aware": true }),
            &NormalizerPolicy::default(),
        );
        let textual = normalized_value(
            json!({ "Node Type": "Aggregate", "Partial Mode": "Simple", "Parallel Aware": "TRUE" }),
            &NormalizerPolicy::default(),
        );
        assert_eq!(native, textual);
        assert_eq!(textual["Parallel Aware"], json!(true));
        assert_eq!(
            normalized_value(json!({ "Node Type": "Result", "Inner Unique": "False" }), &NormalizerPolicy::default())["Inner Unique"],
            json!(false)
        );
    }

    #[test]
    fn test_non_boolean_strings_untouched() {
        let out = normalized_value(
            json!({ "Node Type": "Seq Scan", "Alias": "truest", "Relation Name": "t" }),
            &NormalizerPolicy::default(),
        );
        assert_eq!(out["Alias"], json!("truest"));
    }

    #[test]
    fn test_sibling_order_preserved() {
        let out = normalized_value(
            json!({
                "Node Type": "Nested Loop",
                "Plans": [
                    { "Node Type": "Seq Scan", "Relation Name": "b" },
                    { "Node Type": "Seq Scan", "Relation Name": "a" }
                ]
            }),
            &NormalizerPolicy::default(),
        );
        assert_eq!(out["Plans"][0]["Relation Name"], json!("b"));
        assert_eq!(out["Plans"][1]["Relation Name"], json!("a"));
    }

    #[test]
    fn test_raw_text_passes_through() {
        let tree = normalize(&doc(json!("Sort  (cost=1..2)")), &NormalizerPolicy::default());
        assert_eq!(tree, CanonicalTree::RawText("Sort  (cost=1..2)".to_string()));
    }

    #[test]
    fn test_custom_deny_entry() {
        let policy = NormalizerPolicy::postgres().deny("Alias");
        let out = normalized_value(
            json!({ "Node Type": "Seq Scan", "Alias": "l", "Relation Name": "lineitem" }),
            &policy,
        );
        assert!(out.get("Alias").is_none());
        assert_eq!(out["Relation Name"], json!("lineitem"));
    }

    #[test]
    fn test_canonicalizer_trait() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.strategy(), CanonicalStrategy::Normalize);
        let tree = normalizer
            .canonicalize(&doc(json!({ "Node Type": "Result", "Total Cost": 0.01 })))
            .unwrap();
        assert_eq!(tree.to_value(), json!({ "Node Type": "Result" }));
    }
}
