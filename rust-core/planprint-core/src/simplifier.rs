// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan simplifier.
//!
//! Projects each node onto a small operator vocabulary: operator kind,
//! physical algorithm and (for scans) relation name. Everything else is
//! discarded, so plans with different costs, row counts or predicates but the
//! same operator shape collapse to one identity.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{CanonicalTree, Canonicalizer, SimplifiedNode};
use crate::config::CanonicalStrategy;
use crate::document::{PlanDocument, PlanNode, ResolvedPlan};
use crate::error::{PlanError, PlanResult};

/// Attribute naming the scanned relation.
pub const RELATION_KEY: &str = "Relation Name";
/// Attribute qualifying an `Aggregate` node (`Hashed`, `Sorted`, `Plain`, `Mixed`).
pub const STRATEGY_KEY: &str = "Strategy";

/// Canonical operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorKind {
    Scan,
    Join,
    Aggregate,
    Sort,
    /// Engine-native operator missing from the table.
    Unknown,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorKind::Scan => write!(f, "Scan"),
            OperatorKind::Join => write!(f, "Join"),
            OperatorKind::Aggregate => write!(f, "Aggregate"),
            OperatorKind::Sort => write!(f, "Sort"),
            OperatorKind::Unknown => write!(f, "Unknown"),
        }
    }
}

impl FromStr for OperatorKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scan" => Ok(OperatorKind::Scan),
            "join" => Ok(OperatorKind::Join),
            "aggregate" => Ok(OperatorKind::Aggregate),
            "sort" => Ok(OperatorKind::Sort),
            "unknown" => Ok(OperatorKind::Unknown),
            _ => Err(PlanError::invalid_field("op", format!("unknown operator kind {s:?}"))),
        }
    }
}

/// Canonical (kind, algorithm) pair for one engine-native node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMapping {
    pub kind: OperatorKind,
    pub algorithm: String,
}

impl OperatorMapping {
    pub fn new(kind: OperatorKind, algorithm: impl Into<String>) -> Self {
        Self {
            kind,
            algorithm: algorithm.into(),
        }
    }
}

/// Mapping from engine-native node types to canonical operators.
///
/// Keys are either a bare node type (`"Hash Join"`) or a node type qualified
/// by its `Strategy` attribute (`"Aggregate:Hashed"`). Qualified keys win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorTable {
    entries: BTreeMap<String, OperatorMapping>,
}

impl OperatorTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Node types emitted by PostgreSQL `EXPLAIN (FORMAT JSON)`.
    pub fn postgres() -> Self {
        use OperatorKind::*;

        Self::empty()
            .with("Seq Scan", Scan, "SeqScan")
            .with("Index Scan", Scan, "IndexScan")
            .with("Index Only Scan", Scan, "IndexOnlyScan")
            .with("Bitmap Heap Scan", Scan, "BitmapHeapScan")
            .with("Bitmap Index Scan", Scan, "BitmapIndexScan")
            .with("Aggregate:Hashed", Aggregate, "HashAggregate")
            .with("Aggregate:Sorted", Aggregate, "GroupAggregate")
            .with("Aggregate:Plain", Aggregate, "PlainAggregate")
            .with("Aggregate:Mixed", Aggregate, "MixedAggregate")
            // text-format spellings
            .with("HashAggregate", Aggregate, "HashAggregate")
            .with("GroupAggregate", Aggregate, "GroupAggregate")
            .with("Sort", Sort, "InMemorySort")
            .with("Incremental Sort", Sort, "IncrementalSort")
            .with("Hash Join", Join, "HashJoin")
            .with("Nested Loop", Join, "NestedLoop")
            .with("Merge Join", Join, "MergeJoin")
    }

    /// Add or replace an entry.
    pub fn with(mut self, node_type: impl Into<String>, kind: OperatorKind, algorithm: impl Into<String>) -> Self {
        self.entries
            .insert(node_type.into(), OperatorMapping::new(kind, algorithm));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mapping for a node, preferring the strategy-qualified entry.
    pub fn lookup(&self, node: &PlanNode) -> Option<&OperatorMapping> {
        if let Some(Value::String(strategy)) = node.attribute(STRATEGY_KEY) {
            let qualified = format!("{}:{}", node.node_type(), strategy);
            if let Some(mapping) = self.entries.get(&qualified) {
                return Some(mapping);
            }
        }
        self.entries.get(node.node_type())
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::postgres()
    }
}

/// What to do with a node type missing from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOperatorPolicy {
    /// Emit `Unknown` with the engine-native name as the algorithm.
    #[default]
    Tolerant,
    /// Fail with [`PlanError::UnsupportedOperator`].
    Strict,
}

/// Operator table plus the unknown-operator policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifierPolicy {
    pub operators: OperatorTable,
    pub unknown_operators: UnknownOperatorPolicy,
}

impl SimplifierPolicy {
    pub fn strict() -> Self {
        Self {
            unknown_operators: UnknownOperatorPolicy::Strict,
            ..Self::default()
        }
    }
}

/// Operator-projection canonicalizer.
#[derive(Debug, Clone, Default)]
pub struct Simplifier {
    policy: SimplifierPolicy,
}

impl Simplifier {
    pub fn new(policy: SimplifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SimplifierPolicy {
        &self.policy
    }
}

impl Canonicalizer for Simplifier {
    fn strategy(&self) -> CanonicalStrategy {
        CanonicalStrategy::Simplify
    }

    fn canonicalize(&self, document: &PlanDocument) -> PlanResult<CanonicalTree> {
        simplify(document, &self.policy)
    }
}

/// Simplify `document` under `policy`.
///
/// Text-format plans yield the raw-text sentinel, as with normalization.
pub fn simplify(document: &PlanDocument, policy: &SimplifierPolicy) -> PlanResult<CanonicalTree> {
    match document.resolve() {
        ResolvedPlan::Tree { root, .. } => Ok(CanonicalTree::Simplified(simplify_node(root, policy)?)),
        ResolvedPlan::RawText(text) => Ok(CanonicalTree::RawText(text.to_string())),
    }
}

fn simplify_node(node: &PlanNode, policy: &SimplifierPolicy) -> PlanResult<SimplifiedNode> {
    let (op, algo) = match policy.operators.lookup(node) {
        Some(mapping) => (mapping.kind, mapping.algorithm.clone()),
        None => match policy.unknown_operators {
            UnknownOperatorPolicy::Tolerant => (OperatorKind::Unknown, node.node_type().to_string()),
            UnknownOperatorPolicy::Strict => {
                return Err(PlanError::UnsupportedOperator(node.node_type().to_string()))
            }
        },
    };

    let relation = match op {
        OperatorKind::Scan => node
            .attribute(RELATION_KEY)
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    let children = node
        .children()
        .iter()
        .map(|child| simplify_node(child, policy))
        .collect::<PlanResult<Vec<_>>>()?;

    Ok(SimplifiedNode {
        op,
        algo,
        relation,
        children,
    })
}
