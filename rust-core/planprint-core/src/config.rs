// SPDX-License-Identifier: PMPL-1.0-or-later
//! Canonicalization configuration.
//!
//! Defaults:
//! - strategy: normalize (field deny-list)
//! - filter predicates stripped
//! - unknown operators tolerated by the simplifier

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::canonical::{CanonicalTree, Canonicalizer};
use crate::document::{PlanDocument, CHILDREN_KEY, NODE_TYPE_KEY};
use crate::error::{PlanError, PlanResult};
use crate::normalizer::{Normalizer, NormalizerPolicy};
use crate::simplifier::{Simplifier, SimplifierPolicy};

/// Which canonical form plan identity is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalStrategy {
    /// Every field except known noise must match.
    #[default]
    Normalize,
    /// Only operator kind, algorithm and relation must match.
    Simplify,
}

impl fmt::Display for CanonicalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalStrategy::Normalize => write!(f, "normalize"),
            CanonicalStrategy::Simplify => write!(f, "simplify"),
        }
    }
}

impl FromStr for CanonicalStrategy {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normalize" => Ok(CanonicalStrategy::Normalize),
            "simplify" => Ok(CanonicalStrategy::Simplify),
            _ => Err(PlanError::InvalidConfig(format!("unknown strategy: {s}"))),
        }
    }
}

/// Full canonicalization configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalizationConfig {
    pub strategy: CanonicalStrategy,
    pub normalizer: NormalizerPolicy,
    pub simplifier: SimplifierPolicy,
}

impl CanonicalizationConfig {
    /// Default policies with the given strategy.
    pub fn with_strategy(strategy: CanonicalStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration document and validate it.
    /// Omitted sections keep their defaults.
    pub fn from_json(json: &str) -> PlanResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject policies that would strip the tree structure itself.
    pub fn validate(&self) -> PlanResult<()> {
        for structural in [NODE_TYPE_KEY, CHILDREN_KEY] {
            if self.normalizer.deny_list.contains(structural)
                || self.normalizer.filter_fields.contains(structural)
            {
                return Err(PlanError::InvalidConfig(format!(
                    "\"{structural}\" is structural and cannot be denied"
                )));
            }
        }
        if self.strategy == CanonicalStrategy::Simplify && self.simplifier.operators.is_empty() {
            return Err(PlanError::InvalidConfig(
                "simplify strategy needs a non-empty operator table".to_string(),
            ));
        }
        Ok(())
    }

    /// Canonicalizer for the configured strategy.
    pub fn canonicalizer(&self) -> Box<dyn Canonicalizer> {
        match self.strategy {
            CanonicalStrategy::Normalize => Box::new(Normalizer::new(self.normalizer.clone())),
            CanonicalStrategy::Simplify => Box::new(Simplifier::new(self.simplifier.clone())),
        }
    }

    /// Canonicalize one document with the configured strategy.
    pub fn canonicalize(&self, document: &PlanDocument) -> PlanResult<CanonicalTree> {
        match self.strategy {
            CanonicalStrategy::Normalize => Ok(crate::normalizer::normalize(document, &self.normalizer)),
            CanonicalStrategy::Simplify => crate::simplifier::simplify(document, &self.simplifier),
        }
    }
}
