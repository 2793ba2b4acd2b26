//! # Correlation Results
//!
//! Output types of the correlation engine: the correlation claim itself, the
//! closed set of reasons a claim can carry, and the warning passthrough type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Rule-family name carried by heuristic correlations made from static
/// adapter data.
pub const STATIC_ANALYSIS: &str = "StaticAnalysis";
/// Rule-family name carried by heuristic correlations that involve a scanner
/// record.
pub const SCANNER_ANALYSIS: &str = "ScannerAnalysis";

/// Why a correlation was made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrelationReason {
    /// Exact identity: two instances of the same adapter type reported the
    /// same vendor-native id. Certainty is definitional, not heuristic.
    Logic,
    /// Produced by a comparator rule; carries the rule family name.
    Heuristic(String),
    /// Deduced transitively through a record outside the caller's working
    /// set.
    NonexistentDeduction,
}

impl CorrelationReason {
    pub fn static_analysis() -> Self {
        Self::Heuristic(STATIC_ANALYSIS.to_string())
    }

    pub fn scanner_analysis() -> Self {
        Self::Heuristic(SCANNER_ANALYSIS.to_string())
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, Self::Logic)
    }
}

impl fmt::Display for CorrelationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logic => write!(f, "Logic"),
            Self::Heuristic(kind) => write!(f, "{kind}"),
            Self::NonexistentDeduction => write!(f, "NonexistentDeduction"),
        }
    }
}

/// A claim that two adapter records refer to the same real-world asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// `(name, id)` addressing pairs. The first element is the record offered
    /// by the engine as the basis of comparison and its name is always a
    /// `plugin_unique_name`. The second element's name is a
    /// `plugin_unique_name` for `Logic` results but only a `plugin_name` for
    /// heuristic ones until post-processing resolves the instance.
    pub associated_adapters: [(String, String); 2],
    /// Free-form explanation, e.g. `{"Reason": "They have the same serial"}`.
    pub data: Value,
    pub reason: CorrelationReason,
}

impl CorrelationResult {
    pub fn new(
        first: (String, String),
        second: (String, String),
        data: Value,
        reason: CorrelationReason,
    ) -> Self {
        Self {
            associated_adapters: [first, second],
            data,
            reason,
        }
    }

    /// The addressing pair in a canonical order, used for deduplication.
    pub fn sorted_pair(&self) -> [(String, String); 2] {
        let mut pair = self.associated_adapters.clone();
        pair.sort();
        pair
    }
}

impl fmt::Display for CorrelationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [(first_name, first_id), (second_name, second_id)] = &self.associated_adapters;
        write!(
            f,
            "{}/{} <-> {}/{} ({})",
            first_name, first_id, second_name, second_id, self.reason
        )
    }
}

/// A non-correlation observation raised by a correlator implementation.
///
/// Warnings flow through [`correlate`](crate::engine::CorrelatorEngine::correlate)
/// unmodified; the engine never post-processes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningResult {
    pub title: String,
    pub content: String,
}

impl WarningResult {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// One item of the correlation output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CorrelationOutcome {
    Correlation(CorrelationResult),
    Warning(WarningResult),
}

impl CorrelationOutcome {
    pub fn as_correlation(&self) -> Option<&CorrelationResult> {
        match self {
            Self::Correlation(result) => Some(result),
            Self::Warning(_) => None,
        }
    }
}
