// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for canonicalization and fingerprinting

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use planprint_core::{
    fingerprint, normalize, plans_match, simplify, Fingerprint, NormalizerPolicy, PlanDocument,
    SimplifierPolicy,
};

const NOISE_FIELDS: &[&str] = &[
    "Startup Cost",
    "Total Cost",
    "Plan Rows",
    "Plan Width",
    "Actual Startup Time",
    "Actual Total Time",
    "Actual Rows",
    "Actual Loops",
    "Shared Hit Blocks",
    "Shared Read Blocks",
    "Temp Written Blocks",
    "Workers Launched",
    "Peak Memory Usage",
    "Async Capable",
];

/// Generate engine-native node types, including some the simplifier does not know
fn arb_node_type() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "Seq Scan",
        "Index Scan",
        "Sort",
        "Hash Join",
        "Nested Loop",
        "Merge Join",
        "Hash",
        "Gather",
        "Limit",
    ])
    .prop_map(str::to_string)
}

/// Generate relation names
fn arb_relation() -> impl Strategy<Value = String> {
    "[a-z]{3,10}"
}

/// Generate a single node with structural and noise attributes
fn arb_node() -> impl Strategy<Value = Value> {
    (
        arb_node_type(),
        arb_relation(),
        0.0f64..1.0e6,
        0u32..1_000_000,
        any::<bool>(),
    )
        .prop_map(|(node_type, relation, cost, rows, parallel)| {
            json!({
                "Node Type": node_type,
                "Relation Name": relation,
                "Parallel Aware": parallel,
                "Startup Cost": cost / 10.0,
                "Total Cost": cost,
                "Plan Rows": rows,
                "Actual Rows": rows / 2,
                "Actual Loops": 1
            })
        })
}

/// Generate plan trees up to four levels deep
fn arb_plan() -> impl Strategy<Value = Value> {
    arb_node().prop_recursive(4, 32, 3, |inner| {
        (arb_node(), prop::collection::vec(inner, 1..3)).prop_map(|(mut node, children)| {
            node["Plans"] = Value::Array(children);
            node
        })
    })
}

fn doc(value: &Value) -> PlanDocument {
    PlanDocument::from_value(value).unwrap()
}

fn normalized_fp(value: &Value) -> Fingerprint {
    fingerprint(&normalize(&doc(value), &NormalizerPolicy::default())).unwrap()
}

fn simplified_fp(value: &Value) -> Fingerprint {
    fingerprint(&simplify(&doc(value), &SimplifierPolicy::default()).unwrap()).unwrap()
}

/// Rebuild every mapping with its keys in reverse insertion order
fn reverse_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut reversed = Map::new();
            for (key, v) in map.iter().rev() {
                reversed.insert(key.clone(), reverse_keys(v));
            }
            Value::Object(reversed)
        }
        Value::Array(items) => Value::Array(items.iter().map(reverse_keys).collect()),
        other => other.clone(),
    }
}

/// Overwrite (or add) every noise field at every depth
fn perturb_noise(value: &Value, seed: u64) -> Value {
    let mut out = value.clone();
    if let Value::Object(map) = &mut out {
        for (i, field) in NOISE_FIELDS.iter().enumerate() {
            map.insert(field.to_string(), json!(seed.wrapping_mul(i as u64 + 7) % 100_000));
        }
        if let Some(Value::Array(children)) = map.get_mut("Plans") {
            for child in children.iter_mut() {
                *child = perturb_noise(child, seed.rotate_left(3));
            }
        }
    }
    out
}

/// Replace native booleans with their text spelling, in mixed case
fn stringify_booleans(value: &Value) -> Value {
    match value {
        Value::Bool(true) => json!("True"),
        Value::Bool(false) => json!("FALSE"),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), stringify_booleans(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(stringify_booleans).collect()),
        other => other.clone(),
    }
}

proptest! {
    #[test]
    fn test_fingerprint_is_deterministic(plan in arb_plan()) {
        prop_assert_eq!(normalized_fp(&plan), normalized_fp(&plan));
        prop_assert_eq!(simplified_fp(&plan), simplified_fp(&plan));
    }

    #[test]
    fn test_key_order_does_not_matter(plan in arb_plan()) {
        let reordered = reverse_keys(&plan);
        prop_assert_eq!(normalized_fp(&plan), normalized_fp(&reordered));
        prop_assert_eq!(simplified_fp(&plan), simplified_fp(&reordered));
    }

    #[test]
    fn test_noise_does_not_matter(plan in arb_plan(), seed in any::<u64>()) {
        let noisy = perturb_noise(&plan, seed);
        prop_assert!(plans_match(&normalized_fp(&plan), &normalized_fp(&noisy)));
        prop_assert!(plans_match(&simplified_fp(&plan), &simplified_fp(&noisy)));
    }

    #[test]
    fn test_wrappers_do_not_matter(plan in arb_plan(), runtime in 0.0f64..1.0e5) {
        let wrapped = json!([{ "Plan": plan.clone(), "Execution Time": runtime }]);
        prop_assert_eq!(normalized_fp(&plan), normalized_fp(&wrapped));
    }

    #[test]
    fn test_relation_change_is_detected(plan in arb_plan()) {
        let mut changed = plan.clone();
        changed["Relation Name"] = json!("zz_renamed_relation");
        prop_assert!(!plans_match(&normalized_fp(&plan), &normalized_fp(&changed)));
    }

    #[test]
    fn test_node_type_change_is_detected(plan in arb_plan()) {
        let mut changed = plan.clone();
        changed["Node Type"] = json!("Custom Scan");
        prop_assert!(!plans_match(&normalized_fp(&plan), &normalized_fp(&changed)));
        prop_assert!(!plans_match(&simplified_fp(&plan), &simplified_fp(&changed)));
    }

    #[test]
    fn test_child_order_is_detected(left in arb_plan(), right in arb_plan()) {
        let a = json!({ "Node Type": "Hash Join", "Plans": [left.clone(), right.clone()] });
        let b = json!({ "Node Type": "Hash Join", "Plans": [right.clone(), left.clone()] });
        prop_assume!(normalized_fp(&left) != normalized_fp(&right));
        prop_assert!(!plans_match(&normalized_fp(&a), &normalized_fp(&b)));
    }

    #[test]
    fn test_boolean_spelling_does_not_matter(plan in arb_plan()) {
        let textual = stringify_booleans(&plan);
        prop_assert_eq!(normalized_fp(&plan), normalized_fp(&textual));
    }
}
