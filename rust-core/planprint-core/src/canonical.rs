// SPDX-License-Identifier: PMPL-1.0-or-later
//! Canonical plan trees.
//!
//! Two canonical forms exist and are never mixed in one fingerprint:
//! [`NormalizedNode`] keeps every attribute outside the noise deny-list,
//! [`SimplifiedNode`] keeps only operator kind, algorithm and relation.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::CanonicalStrategy;
use crate::document::{PlanDocument, CHILDREN_KEY};
use crate::error::PlanResult;
use crate::simplifier::OperatorKind;

/// Key carrying the verbatim text of a text-format plan.
pub const RAW_TEXT_KEY: &str = "_raw_text";
/// Key tagging the raw-text sentinel.
pub const FORMAT_KEY: &str = "_format";

/// A node after noise removal. `attributes` includes `Node Type`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedNode {
    pub attributes: Map<String, Value>,
    pub children: Vec<NormalizedNode>,
}

impl NormalizedNode {
    /// JSON shape of the node: its attributes plus `Plans` when it has children.
    pub fn to_value(&self) -> Value {
        let mut map = self.attributes.clone();
        if !self.children.is_empty() {
            map.insert(
                CHILDREN_KEY.to_string(),
                Value::Array(self.children.iter().map(NormalizedNode::to_value).collect()),
            );
        }
        Value::Object(map)
    }
}

/// A node projected onto the canonical operator vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplifiedNode {
    pub op: OperatorKind,
    pub algo: String,
    /// Set for scan operators only.
    pub relation: Option<String>,
    pub children: Vec<SimplifiedNode>,
}

impl SimplifiedNode {
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("op".to_string(), Value::String(self.op.to_string()));
        map.insert("algo".to_string(), Value::String(self.algo.clone()));
        if let Some(relation) = &self.relation {
            map.insert("relation".to_string(), Value::String(relation.clone()));
        }
        map.insert(
            "children".to_string(),
            Value::Array(self.children.iter().map(SimplifiedNode::to_value).collect()),
        );
        Value::Object(map)
    }
}

/// Output of a canonicalization strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalTree {
    Normalized(NormalizedNode),
    Simplified(SimplifiedNode),
    /// Sentinel for text-format plans, carrying the original text verbatim.
    RawText(String),
}

impl CanonicalTree {
    pub fn to_value(&self) -> Value {
        match self {
            CanonicalTree::Normalized(node) => node.to_value(),
            CanonicalTree::Simplified(node) => node.to_value(),
            CanonicalTree::RawText(text) => {
                let mut map = Map::new();
                map.insert(RAW_TEXT_KEY.to_string(), Value::String(text.clone()));
                map.insert(FORMAT_KEY.to_string(), Value::String("text".to_string()));
                Value::Object(map)
            }
        }
    }

    pub fn is_raw_text(&self) -> bool {
        matches!(self, CanonicalTree::RawText(_))
    }
}

impl Serialize for CanonicalTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// A canonicalization strategy.
///
/// Implementations are stateless apart from their policy, so one instance can
/// be shared across threads comparing different run pairs.
pub trait Canonicalizer: Send + Sync {
    /// Which strategy this canonicalizer implements.
    fn strategy(&self) -> CanonicalStrategy;

    /// Reduce a plan document to its canonical tree.
    fn canonicalize(&self, document: &PlanDocument) -> PlanResult<CanonicalTree>;
}
