// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan documents and plan nodes.
//!
//! A plan arrives in one of several wire shapes depending on the export path
//! (`EXPLAIN (FORMAT JSON)` list wrapper, a `{"Plan": ...}` envelope, a bare
//! node, or plain text). [`PlanDocument`] decodes that shape exactly once at
//! the boundary; everything downstream works on [`ResolvedPlan`].

use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{PlanError, PlanResult};

/// Attribute naming the engine-native operator of a node.
pub const NODE_TYPE_KEY: &str = "Node Type";
/// Attribute holding the ordered child nodes.
pub const CHILDREN_KEY: &str = "Plans";
/// Envelope key wrapping the root node.
pub const PLAN_KEY: &str = "Plan";

/// One operator in an execution tree.
///
/// `attributes` keeps document order and never contains [`NODE_TYPE_KEY`] or
/// [`CHILDREN_KEY`]; those are lifted into `node_type` and `children`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    node_type: String,
    attributes: Map<String, Value>,
    children: Vec<PlanNode>,
}

impl PlanNode {
    /// Create a leaf node with no attributes.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            attributes: Map::new(),
            children: Vec::new(),
        }
    }

    /// Add an attribute. `name` must not be [`NODE_TYPE_KEY`] or
    /// [`CHILDREN_KEY`]; use [`with_child`](Self::with_child) for children.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        debug_assert!(
            name != NODE_TYPE_KEY && name != CHILDREN_KEY,
            "structural key {name:?} passed as attribute"
        );
        self.attributes.insert(name, value);
        self
    }

    /// Append a child node.
    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn children(&self) -> &[PlanNode] {
        &self.children
    }

    /// Decode a node from a JSON value. `path` locates the node in error messages.
    pub fn from_value(value: &Value, path: &str) -> PlanResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map, path),
            other => Err(PlanError::malformed(
                path,
                format!("expected a plan node mapping, found {}", value_kind(other)),
            )),
        }
    }

    fn from_map(map: &Map<String, Value>, path: &str) -> PlanResult<Self> {
        let node_type = match map.get(NODE_TYPE_KEY) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(PlanError::malformed(
                    path,
                    format!("\"{NODE_TYPE_KEY}\" must be text, found {}", value_kind(other)),
                ))
            }
            None => {
                return Err(PlanError::malformed(
                    path,
                    format!("missing \"{NODE_TYPE_KEY}\""),
                ))
            }
        };

        let mut attributes = Map::new();
        let mut children = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                NODE_TYPE_KEY => {}
                CHILDREN_KEY => {
                    let items = value.as_array().ok_or_else(|| {
                        PlanError::malformed(
                            path,
                            format!("\"{CHILDREN_KEY}\" must be a list, found {}", value_kind(value)),
                        )
                    })?;
                    for (i, item) in items.iter().enumerate() {
                        let child_path = format!("{path}.{CHILDREN_KEY}[{i}]");
                        children.push(Self::from_value(item, &child_path)?);
                    }
                }
                _ => {
                    attributes.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(Self {
            node_type,
            attributes,
            children,
        })
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PlanNode::node_count).sum::<usize>()
    }
}

/// A plan document in any of the accepted wire shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDocument {
    /// `{"Plan": {...}, "Execution Time": ..., ...}` — the envelope keeps
    /// every top-level field other than `Plan`.
    Wrapped {
        root: PlanNode,
        envelope: Map<String, Value>,
    },
    /// A bare plan node.
    Bare(PlanNode),
    /// A single-element list wrapping another document.
    Sequence(Box<PlanDocument>),
    /// A plan captured in text format. Never parsed further.
    RawText(String),
}

/// A document reduced to its tree root (or its raw text).
#[derive(Debug, Clone, Copy)]
pub enum ResolvedPlan<'a> {
    Tree {
        root: &'a PlanNode,
        envelope: Option<&'a Map<String, Value>>,
    },
    RawText(&'a str),
}

impl PlanDocument {
    /// Decode a document from an already-parsed JSON value.
    pub fn from_value(value: &Value) -> PlanResult<Self> {
        Self::decode(value, "$")
    }

    /// Parse a document from JSON text.
    pub fn from_json_str(json: &str) -> PlanResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    fn decode(value: &Value, path: &str) -> PlanResult<Self> {
        match value {
            Value::String(text) => Ok(PlanDocument::RawText(text.clone())),
            Value::Array(items) => match items.as_slice() {
                [Value::Array(_)] => Err(PlanError::malformed(
                    format!("{path}[0]"),
                    "plan lists do not nest",
                )),
                [only] => Ok(PlanDocument::Sequence(Box::new(Self::decode(
                    only,
                    &format!("{path}[0]"),
                )?))),
                _ => Err(PlanError::malformed(
                    path,
                    format!("expected a single-element plan list, found {} elements", items.len()),
                )),
            },
            Value::Object(map) => match map.get(PLAN_KEY) {
                Some(plan) => {
                    let root = PlanNode::from_value(plan, &format!("{path}.{PLAN_KEY}"))?;
                    let envelope = map
                        .iter()
                        .filter(|(key, _)| key.as_str() != PLAN_KEY)
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect();
                    Ok(PlanDocument::Wrapped { root, envelope })
                }
                None => Ok(PlanDocument::Bare(PlanNode::from_map(map, path)?)),
            },
            other => Err(PlanError::malformed(
                path,
                format!("expected a plan document, found {}", value_kind(other)),
            )),
        }
    }

    /// Unwrap list and envelope layers down to the tree root.
    pub fn resolve(&self) -> ResolvedPlan<'_> {
        match self {
            PlanDocument::Wrapped { root, envelope } => ResolvedPlan::Tree {
                root,
                envelope: Some(envelope),
            },
            PlanDocument::Bare(root) => ResolvedPlan::Tree {
                root,
                envelope: None,
            },
            PlanDocument::Sequence(inner) => inner.resolve(),
            PlanDocument::RawText(text) => ResolvedPlan::RawText(text),
        }
    }

    /// Root node, or `None` for a text-format plan.
    pub fn root(&self) -> Option<&PlanNode> {
        match self.resolve() {
            ResolvedPlan::Tree { root, .. } => Some(root),
            ResolvedPlan::RawText(_) => None,
        }
    }
}

impl FromStr for PlanDocument {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json_str(s)
    }
}

impl<'de> Deserialize<'de> for PlanDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
