use crate::types::ContextDraft;
use frameticket_common::QualityConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

static PLACEHOLDER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(frame|group|rectangle|ellipse|vector|text|component|instance|line|polygon|star|layer|image|section)(\s*\d+)?$",
    )
    .expect("placeholder pattern is valid")
});

static LOREM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blorem ipsum\b").expect("lorem pattern is valid"));

static UNRESOLVED_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^}]*\}").expect("placeholder pattern is valid"));

const GENERIC_STACKS: &[&str] = &["", "tbd", "n/a", "na", "todo", "unknown", "none", "-"];

/// Non-fatal marker that a package is below the quality threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowQualityWarning {
    pub score: f64,
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextQualityReport {
    pub score: f64,
    pub completeness: f64,
    pub specificity: f64,
    pub traceability: f64,
    pub structural_clarity: f64,
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<LowQualityWarning>,
}

/// Scores how usable a context draft is for ticket generation. Advisory only.
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new() -> Self {
        Self {
            config: QualityConfig::default(),
        }
    }

    pub fn with_config(mut self, config: QualityConfig) -> Self {
        self.config = config;
        self
    }

    pub fn score(&self, draft: &ContextDraft) -> ContextQualityReport {
        let mut suggestions = Vec::new();

        let completeness = self.completeness(draft, &mut suggestions);
        let specificity = self.specificity(draft, &mut suggestions);
        let traceability = self.traceability(draft, &mut suggestions);
        let structural_clarity = self.structural_clarity(draft, &mut suggestions);

        if let Some(truncation) = &draft.truncation {
            suggestions.push(format!(
                "Context was truncated ({} characters, {} nodes, {} style lines and {} violations omitted); split the selection into smaller frames",
                truncation.omitted_chars,
                truncation.omitted_nodes,
                truncation.omitted_styles,
                truncation.omitted_violations
            ));
        }

        let score = (completeness + specificity + traceability + structural_clarity) / 4.0;

        let warning = if score < self.config.low_quality_threshold {
            let message = format!(
                "Context quality {:.0} is below {:.0}: enrich the design input (names, text, links, tech stack) before generating tickets",
                score, self.config.low_quality_threshold
            );
            warn!("Selection {}: {}", draft.selection_index, message);
            suggestions.push(message.clone());
            Some(LowQualityWarning {
                score,
                threshold: self.config.low_quality_threshold,
                message,
            })
        } else {
            None
        };

        debug!(
            "Quality for selection {}: {:.1} (completeness {:.0}, specificity {:.0}, traceability {:.0}, clarity {:.0})",
            draft.selection_index, score, completeness, specificity, traceability, structural_clarity
        );

        ContextQualityReport {
            score,
            completeness,
            specificity,
            traceability,
            structural_clarity,
            suggestions,
            warning,
        }
    }

    fn completeness(&self, draft: &ContextDraft, suggestions: &mut Vec<String>) -> f64 {
        let checks = [
            (!draft.text.trim().is_empty(), "Add text content (labels, copy) to the selected frames"),
            (!draft.styles.is_empty(), "Selection has no styles; apply fills, spacing or text styles"),
            (
                draft.tech_stack.as_deref().is_some_and(|s| !s.trim().is_empty()),
                "Provide a tech stack hint so tickets target the right framework",
            ),
            (draft.frame_link.is_some(), "Provide a frame link template for traceability"),
        ];
        let present = checks.iter().filter(|(ok, _)| *ok).count();
        let score = 100.0 * present as f64 / checks.len() as f64;
        if score < self.config.suggestion_threshold {
            suggestions.extend(
                checks
                    .iter()
                    .filter(|(ok, _)| !*ok)
                    .map(|(_, hint)| hint.to_string()),
            );
        }
        score
    }

    fn specificity(&self, draft: &ContextDraft, suggestions: &mut Vec<String>) -> f64 {
        let mut deductions = 0.0;

        let placeholders = draft
            .structure
            .layer_names
            .iter()
            .filter(|name| name.trim().is_empty() || PLACEHOLDER_NAME.is_match(name.trim()))
            .count();
        if placeholders > 0 {
            deductions += (placeholders as f64 * 5.0).min(30.0);
            suggestions.push(format!(
                "Rename {} layer(s) with default names (e.g. \"Frame 12\") to describe their purpose",
                placeholders
            ));
        }

        if draft.structure.empty_text_nodes > 0 {
            deductions += (draft.structure.empty_text_nodes as f64 * 10.0).min(30.0);
            suggestions.push(format!(
                "Fill in {} empty text layer(s)",
                draft.structure.empty_text_nodes
            ));
        }

        if draft.text.trim().is_empty() {
            deductions += 20.0;
        } else if LOREM.is_match(&draft.text) {
            deductions += 15.0;
            suggestions.push("Replace lorem ipsum with real copy".to_string());
        }

        let generic_stack = match draft.tech_stack.as_deref() {
            Some(stack) => GENERIC_STACKS.contains(&stack.trim().to_lowercase().as_str()),
            None => false,
        };
        if generic_stack {
            deductions += 10.0;
            suggestions.push("Tech stack hint is a placeholder; name the actual framework".to_string());
        }

        (100.0 - deductions).max(0.0)
    }

    fn traceability(&self, draft: &ContextDraft, suggestions: &mut Vec<String>) -> f64 {
        let Some(link) = draft.frame_link.as_deref() else {
            suggestions.push("No frame link: tickets cannot point back to the design".to_string());
            return 0.0;
        };
        if is_resolvable_link(link, &draft.node_ids) {
            100.0
        } else {
            suggestions.push(format!(
                "Frame link \"{}\" is malformed or does not reference the selected node",
                link
            ));
            0.0
        }
    }

    fn structural_clarity(&self, draft: &ContextDraft, suggestions: &mut Vec<String>) -> f64 {
        let Some(report) = &draft.compliance else {
            suggestions.push("Run the compliance analysis so structure can be assessed".to_string());
            return 0.0;
        };
        if report.nodes_analyzed == 0 {
            return 100.0;
        }
        let density = report.weighted_violations() / report.nodes_analyzed as f64;
        let score = 100.0 * (1.0 - density.min(1.0));
        if score < self.config.suggestion_threshold {
            suggestions.push(format!(
                "{} design-system violation(s) in the selection; align styles with tokens or reuse components",
                report.violations.len() + draft.truncation.map_or(0, |t| t.omitted_violations)
            ));
        }
        score
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Score a draft with an explicit configuration.
pub fn score(draft: &ContextDraft, config: &QualityConfig) -> ContextQualityReport {
    QualityScorer::new().with_config(config.clone()).score(draft)
}

/// Well-formed http(s) link, no unresolved placeholders, with a path segment or
/// query value equal to one of the nodes.
pub fn is_resolvable_link(link: &str, node_ids: &[String]) -> bool {
    let well_formed = (link.starts_with("https://") || link.starts_with("http://"))
        && !link.chars().any(char::is_whitespace)
        && !UNRESOLVED_PLACEHOLDER.is_match(link);
    if !well_formed {
        return false;
    }
    let tokens: Vec<&str> = link
        .split(|c| matches!(c, '/' | '?' | '&' | '#' | '='))
        .filter(|t| !t.is_empty())
        .collect();
    node_ids.iter().any(|id| {
        let forms = [
            id.clone(),
            id.replace(':', "-"),
            id.replace(':', "%3A"),
            id.replace(':', "%3a"),
        ];
        tokens.iter().any(|token| forms.iter().any(|form| form == token))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StructureSummary, StyleUsage, Truncation};
    use frameticket_core::{Color, DocumentSnapshot, Node, NodeKind, StyleCategory};

    fn draft() -> ContextDraft {
        let snapshot = DocumentSnapshot::new(Node::new("1:2", NodeKind::Frame));
        ContextDraft {
            selection_index: 0,
            snapshot_id: snapshot.id().clone(),
            node_ids: vec!["1:2".to_string()],
            text: "Sign in\nForgot password?".to_string(),
            text_entries: vec!["Sign in".to_string(), "Forgot password?".to_string()],
            structure: StructureSummary {
                node_count: 3,
                depth: 2,
                layer_names: vec!["Login form".into(), "Submit".into(), "Forgot link".into()],
                ..StructureSummary::default()
            },
            styles: vec![StyleUsage {
                category: StyleCategory::Color,
                value: Color::rgb(0, 0, 0).to_hex(),
                token: Some("color-1".into()),
                count: 2,
            }],
            visual_reference: None,
            tech_stack: Some("React + TypeScript".into()),
            frame_link: Some("https://design.example.com/file/abc?node-id=1-2".into()),
            compliance: None,
            truncation: None,
        }
    }

    #[test]
    fn test_complete_draft_scores_high() {
        let report = QualityScorer::new().score(&draft());
        assert_eq!(report.completeness, 100.0);
        assert_eq!(report.specificity, 100.0);
        assert_eq!(report.traceability, 100.0);
        // No compliance report attached.
        assert_eq!(report.structural_clarity, 0.0);
        assert_eq!(report.score, 75.0);
        assert!(report.warning.is_none());
    }

    #[test]
    fn test_placeholders_and_empty_text_are_penalized() {
        let mut d = draft();
        d.structure.layer_names = vec!["Frame 12".into(), "Rectangle".into(), "Checkout".into()];
        d.structure.empty_text_nodes = 1;
        d.text = "Lorem ipsum dolor sit amet".into();
        d.tech_stack = Some("TBD".into());
        let report = QualityScorer::new().score(&d);
        assert_eq!(report.specificity, 100.0 - 10.0 - 10.0 - 15.0 - 10.0);
        assert!(report.suggestions.iter().any(|s| s.contains("lorem ipsum")));
    }

    #[test]
    fn test_low_quality_warning_is_advisory() {
        let mut d = draft();
        d.text.clear();
        d.styles.clear();
        d.tech_stack = None;
        d.frame_link = None;
        let report = QualityScorer::new().score(&d);
        assert!(report.score < 40.0);
        let warning = report.warning.as_ref().expect("warning attached");
        assert_eq!(warning.threshold, 40.0);
        assert_eq!(report.suggestions.last(), Some(&warning.message));
    }

    #[test]
    fn test_truncation_is_flagged() {
        let mut d = draft();
        d.truncation = Some(Truncation {
            omitted_chars: 120,
            ..Truncation::default()
        });
        let report = QualityScorer::new().score(&d);
        assert!(report.suggestions.iter().any(|s| s.contains("truncated")));
    }

    #[test]
    fn test_link_resolution() {
        let ids = vec!["12:34".to_string()];
        assert!(is_resolvable_link("https://x.test/f?node-id=12-34", &ids));
        assert!(is_resolvable_link("https://x.test/f?node-id=12%3A34", &ids));
        assert!(!is_resolvable_link("https://x.test/f?node-id={node_id}", &ids));
        assert!(!is_resolvable_link("ftp://x.test/12-34", &ids));
        assert!(!is_resolvable_link("https://x.test/f?node-id=99-1", &ids));
        assert!(!is_resolvable_link("https://x.test/a b/12-34", &ids));
    }

    #[test]
    fn test_link_must_name_the_node_exactly() {
        let ids = vec!["1:2".to_string()];
        assert!(!is_resolvable_link("https://x.test/f?node-id=11-23", &ids));
        assert!(!is_resolvable_link("https://x.test/f?node-id=1-20", &ids));
        assert!(!is_resolvable_link("https://x.test/f/21:2", &ids));
        assert!(is_resolvable_link("https://x.test/f?node-id=1-2&mode=dev", &ids));
        assert!(is_resolvable_link("https://x.test/f?node-id=1%3a2", &ids));
        assert!(is_resolvable_link("https://x.test/nodes/1:2#top", &ids));
    }
}
