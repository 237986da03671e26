// SPDX-License-Identifier: PMPL-1.0-or-later
//! PlanPrint error types.

use thiserror::Error;

/// Errors raised while decoding, canonicalizing or measuring a plan.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("malformed plan at {path}: {reason}")]
    MalformedPlan { path: String, reason: String },

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("field not found: {0}")]
    MissingField(String),

    #[error("invalid value for field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("plan was captured as text and carries no structured fields")]
    UnstructuredPlan,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlanError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::MalformedPlan {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type PlanResult<T> = Result<T, PlanError>;
