// SPDX-License-Identifier: PMPL-1.0-or-later
//! PlanPrint Core
//!
//! Canonicalization and fingerprinting of query execution plans.
//! Decides whether repeated runs of one query used the same physical
//! strategy, ignoring run-to-run noise (timings, buffers, worker counts),
//! and reports how runtime and filter selectivity moved between runs.
//!
//! Pipeline: [`PlanDocument`] → [`normalize`] or [`simplify`] →
//! [`fingerprint`] → [`plans_match`], with [`extract_runtime`] and
//! [`extract_filter_stats`] reading the raw document. [`compare`] composes
//! all of them.
//!
//! Every function here is pure; comparisons of different run pairs can run
//! on separate threads without coordination.

pub mod canonical;
pub mod compare;
pub mod config;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod normalizer;
pub mod simplifier;

pub use canonical::{CanonicalTree, Canonicalizer, NormalizedNode, SimplifiedNode};
pub use compare::{
    compare, compare_consecutive, compare_runs, summarize, ComparisonResult, HistoryStep,
    HistorySummary, PlanChange, PlanProfile, RunComparison, RunRecord,
};
pub use config::{CanonicalStrategy, CanonicalizationConfig};
pub use document::{PlanDocument, PlanNode, ResolvedPlan};
pub use error::{PlanError, PlanResult};
pub use fingerprint::{canonical_bytes, fingerprint, plans_match, Fingerprint};
pub use metrics::{extract_filter_stats, extract_runtime, FilterStats};
pub use normalizer::{normalize, Normalizer, NormalizerPolicy};
pub use simplifier::{
    simplify, OperatorKind, OperatorMapping, OperatorTable, Simplifier, SimplifierPolicy,
    UnknownOperatorPolicy,
};
