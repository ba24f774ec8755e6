use frameticket_common::SeverityWeights;
use frameticket_core::{NodeKind, SnapshotId, StyleCategory};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categories a compliance report scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceCategory {
    Color,
    Spacing,
    Typography,
    Radius,
    Shadow,
    ComponentReuse,
}

impl ComplianceCategory {
    /// Text color is part of a text style, so it scores under typography.
    pub fn for_attribute(kind: NodeKind, category: StyleCategory) -> Self {
        match category {
            StyleCategory::Color if kind == NodeKind::Text => ComplianceCategory::Typography,
            StyleCategory::Color => ComplianceCategory::Color,
            StyleCategory::Spacing => ComplianceCategory::Spacing,
            StyleCategory::Typography => ComplianceCategory::Typography,
            StyleCategory::Radius => ComplianceCategory::Radius,
            StyleCategory::Shadow => ComplianceCategory::Shadow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceCategory::Color => "color",
            ComplianceCategory::Spacing => "spacing",
            ComplianceCategory::Typography => "typography",
            ComplianceCategory::Radius => "radius",
            ComplianceCategory::Shadow => "shadow",
            ComplianceCategory::ComponentReuse => "component_reuse",
        }
    }
}

impl fmt::Display for ComplianceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Severity for a distance expressed in multiples of its threshold (ratio > 1).
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 1.5 {
            Severity::Low
        } else if ratio < 3.0 {
            Severity::Medium
        } else {
            Severity::High
        }
    }

    pub fn weight(&self, weights: &SeverityWeights) -> f64 {
        match self {
            Severity::Low => weights.low,
            Severity::Medium => weights.medium,
            Severity::High => weights.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub node_id: String,
    pub category: ComplianceCategory,
    /// Token or component the value should have matched.
    pub expected: String,
    pub actual: String,
    pub severity: Severity,
    pub distance: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: ComplianceCategory,
    pub score: f64,
    pub checked: usize,
    pub weighted_violations: f64,
}

/// Compliance of one selection against an inferred design system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub snapshot_id: SnapshotId,
    pub overall_score: f64,
    /// Only categories that had something to check, in category order.
    pub categories: Vec<CategoryScore>,
    pub violations: Vec<Violation>,
    pub nodes_analyzed: usize,
}

impl ComplianceReport {
    pub fn sub_score(&self, category: ComplianceCategory) -> Option<f64> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.score)
    }

    pub fn violations_in(&self, category: ComplianceCategory) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.category == category)
    }

    pub fn weighted_violations(&self) -> f64 {
        self.categories.iter().map(|c| c.weighted_violations).sum()
    }
}
