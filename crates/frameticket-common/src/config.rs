use crate::{FrameTicketError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the design system scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Spacing values are rounded to the nearest multiple of this step.
    pub spacing_step: f64,
    pub radius_step: f64,
    /// Colors closer than this (Euclidean RGB) join the same palette bucket.
    pub color_merge_distance: f64,
    /// A bucket needs at least this many uses to become a token.
    pub min_token_usage: usize,
    pub max_tokens_per_category: usize,
    /// Clusters must score strictly above this to count as components.
    pub min_component_confidence: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            spacing_step: 4.0,
            radius_step: 2.0,
            color_merge_distance: 12.0,
            min_token_usage: 2,
            max_tokens_per_category: 8,
            min_component_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            low: 0.25,
            medium: 0.5,
            high: 1.0,
        }
    }
}

/// Configuration for the compliance analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub color_threshold: f64,
    pub spacing_threshold: f64,
    pub radius_threshold: f64,
    pub typography_threshold: f64,
    pub shadow_threshold: f64,
    /// Child-kind similarity at or above which an unmatched container is a near-miss.
    pub near_miss_similarity: f64,
    /// Analyse whole subtrees of the selected nodes, not just the nodes themselves.
    pub include_descendants: bool,
    pub severity_weights: SeverityWeights,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            color_threshold: 16.0,
            spacing_threshold: 2.0,
            radius_threshold: 2.0,
            typography_threshold: 1.0,
            shadow_threshold: 2.0,
            near_miss_similarity: 0.6,
            include_descendants: true,
            severity_weights: SeverityWeights::default(),
        }
    }
}

/// Configuration for the context quality scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Overall scores below this attach a low-quality warning.
    pub low_quality_threshold: f64,
    /// Dimensions below this get an improvement suggestion.
    pub suggestion_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            low_quality_threshold: 40.0,
            suggestion_threshold: 70.0,
        }
    }
}

/// Per-package payload budget for the assembler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyLimits {
    pub max_nodes: usize,
    pub max_text_chars: usize,
    /// Style usage lines kept per package, most used first.
    pub max_style_lines: usize,
    /// Compliance violations kept per package, most severe first.
    pub max_violations: usize,
    /// Worker count for concurrent assembly.
    pub max_parallel: usize,
}

impl Default for AssemblyLimits {
    fn default() -> Self {
        Self {
            max_nodes: 200,
            max_text_chars: 4000,
            max_style_lines: 40,
            max_violations: 25,
            max_parallel: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub compliance: ComplianceConfig,
    pub quality: QualityConfig,
    pub limits: AssemblyLimits,
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON config; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("scan.spacing_step", self.scan.spacing_step),
            ("scan.radius_step", self.scan.radius_step),
            ("compliance.color_threshold", self.compliance.color_threshold),
            ("compliance.spacing_threshold", self.compliance.spacing_threshold),
            ("compliance.radius_threshold", self.compliance.radius_threshold),
            ("compliance.typography_threshold", self.compliance.typography_threshold),
            ("compliance.shadow_threshold", self.compliance.shadow_threshold),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(FrameTicketError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.scan.color_merge_distance < 0.0 {
            return Err(FrameTicketError::Config(
                "scan.color_merge_distance must not be negative".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.scan.min_component_confidence) {
            return Err(FrameTicketError::Config(
                "scan.min_component_confidence must be in [0, 1)".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.compliance.near_miss_similarity) {
            return Err(FrameTicketError::Config(
                "compliance.near_miss_similarity must be in [0, 1]".to_string(),
            ));
        }
        if self.limits.max_text_chars == 0 || self.limits.max_nodes == 0 {
            return Err(FrameTicketError::Config(
                "limits must allow at least one node and one character".to_string(),
            ));
        }
        if self.limits.max_parallel == 0 {
            return Err(FrameTicketError::Config(
                "limits.max_parallel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
