pub mod report;

pub use report::{CategoryScore, ComplianceCategory, ComplianceReport, Severity, Violation};

use frameticket_common::{ComplianceConfig, FrameTicketError, Result};
use frameticket_core::{DocumentSnapshot, Node, NodeKind, Selection, StyleCategory};
use frameticket_scanner::{InferredComponent, ScanIndex};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Compliance analyzer - scores selections against a scan index
pub struct ComplianceAnalyzer {
    config: ComplianceConfig,
}

#[derive(Default)]
struct Tally {
    checked: usize,
    weighted: f64,
}

impl ComplianceAnalyzer {
    pub fn new() -> Self {
        Self {
            config: ComplianceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ComplianceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn analyze(
        &self,
        selection: &Selection,
        index: &ScanIndex,
        snapshot: &DocumentSnapshot,
    ) -> Result<ComplianceReport> {
        if selection.is_empty() {
            return Err(FrameTicketError::EmptySelection);
        }
        if index.snapshot_id != *snapshot.id() {
            return Err(FrameTicketError::UnknownIndex {
                expected: index.snapshot_id.to_string(),
                actual: snapshot.id().to_string(),
            });
        }

        let nodes = self.resolve(selection, snapshot)?;
        let mut tallies: BTreeMap<ComplianceCategory, Tally> = BTreeMap::new();
        let mut violations = Vec::new();

        for node in &nodes {
            self.check_tokens(node, index, &mut tallies, &mut violations);
            self.check_component(node, index, &mut tallies, &mut violations);
        }

        let categories: Vec<CategoryScore> = tallies
            .into_iter()
            .filter(|(_, tally)| tally.checked > 0)
            .map(|(category, tally)| CategoryScore {
                category,
                score: (100.0 * (1.0 - tally.weighted / tally.checked as f64)).max(0.0),
                checked: tally.checked,
                weighted_violations: tally.weighted,
            })
            .collect();

        let checked: usize = categories.iter().map(|c| c.checked).sum();
        let overall_score = if checked == 0 {
            100.0
        } else {
            categories
                .iter()
                .map(|c| c.score * c.checked as f64)
                .sum::<f64>()
                / checked as f64
        };

        info!(
            "Analyzed {} nodes: score {:.1}, {} violations",
            nodes.len(),
            overall_score,
            violations.len()
        );

        Ok(ComplianceReport {
            snapshot_id: snapshot.id().clone(),
            overall_score,
            categories,
            violations,
            nodes_analyzed: nodes.len(),
        })
    }

    /// Selected nodes (and their subtrees, if configured) in document order, once each.
    fn resolve<'s>(
        &self,
        selection: &Selection,
        snapshot: &'s DocumentSnapshot,
    ) -> Result<Vec<&'s Node>> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for id in &selection.node_ids {
            let node = snapshot
                .node(id)
                .ok_or_else(|| FrameTicketError::NodeNotFound(id.clone()))?;
            if self.config.include_descendants {
                for n in node.iter() {
                    if seen.insert(n.id.as_str()) {
                        nodes.push(n);
                    }
                }
            } else if seen.insert(node.id.as_str()) {
                nodes.push(node);
            }
        }
        nodes.sort_by_key(|n| snapshot.position(&n.id).unwrap_or(usize::MAX));
        Ok(nodes)
    }

    fn check_tokens(
        &self,
        node: &Node,
        index: &ScanIndex,
        tallies: &mut BTreeMap<ComplianceCategory, Tally>,
        violations: &mut Vec<Violation>,
    ) {
        for (property, value) in &node.style {
            // Categories without tokens give nothing to compare against.
            let Some((token, distance)) = index.nearest_token(value) else {
                continue;
            };
            let category = ComplianceCategory::for_attribute(node.kind, value.category());
            let tally = tallies.entry(category).or_default();
            tally.checked += 1;

            let threshold = self.threshold(value.category());
            if distance <= threshold {
                continue;
            }

            let severity = Severity::from_ratio(distance / threshold);
            tally.weighted += severity.weight(&self.config.severity_weights);
            debug!(
                "{} on '{}': {} is {:.1} from {}",
                category,
                node.id,
                value.describe(),
                distance,
                token.id
            );
            violations.push(Violation {
                node_id: node.id.clone(),
                category,
                expected: format!("{} ({})", token.id, token.value.describe()),
                actual: value.describe(),
                severity,
                distance,
                message: format!(
                    "{} {} is off-system; nearest token {} is {} ({:.1} away)",
                    property,
                    value.describe(),
                    token.id,
                    token.value.describe(),
                    distance
                ),
            });
        }
    }

    fn check_component(
        &self,
        node: &Node,
        index: &ScanIndex,
        tallies: &mut BTreeMap<ComplianceCategory, Tally>,
        violations: &mut Vec<Violation>,
    ) {
        if !node.kind.is_container() || node.children.is_empty() || index.components.is_empty() {
            return;
        }
        let tally = tallies.entry(ComplianceCategory::ComponentReuse).or_default();
        tally.checked += 1;

        if node.kind == NodeKind::ComponentInstance && node.component_ref.is_some() {
            return;
        }
        if index.component_for_member(&node.id).is_some() {
            return;
        }

        let signature = index.signature_of(node);
        if index.component_for_signature(&signature).is_some()
            || index
                .components
                .iter()
                .any(|c| c.signature.same_structure(&signature))
        {
            return;
        }

        // First best match wins, so ties resolve to the earlier component.
        let mut best: Option<(&InferredComponent, f64)> = None;
        for component in &index.components {
            let similarity = component.signature.structure_similarity(&signature);
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((component, similarity));
            }
        }
        let Some((component, similarity)) = best else {
            return;
        };
        if similarity < self.config.near_miss_similarity {
            return;
        }

        let severity = Severity::Medium;
        tally.weighted += severity.weight(&self.config.severity_weights);
        violations.push(Violation {
            node_id: node.id.clone(),
            category: ComplianceCategory::ComponentReuse,
            expected: format!("{} ({})", component.id, component.signature.describe()),
            actual: signature.describe(),
            severity,
            distance: 1.0 - similarity,
            message: format!(
                "'{}' nearly matches component {} \"{}\" ({:.0}% similar); consider reusing it",
                node.name,
                component.id,
                component.name,
                similarity * 100.0
            ),
        });
    }

    fn threshold(&self, category: StyleCategory) -> f64 {
        match category {
            StyleCategory::Color => self.config.color_threshold,
            StyleCategory::Spacing => self.config.spacing_threshold,
            StyleCategory::Typography => self.config.typography_threshold,
            StyleCategory::Radius => self.config.radius_threshold,
            StyleCategory::Shadow => self.config.shadow_threshold,
        }
    }
}

impl Default for ComplianceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Analyze with an explicit configuration.
pub fn analyze(
    selection: &Selection,
    index: &ScanIndex,
    snapshot: &DocumentSnapshot,
    config: &ComplianceConfig,
) -> Result<ComplianceReport> {
    ComplianceAnalyzer::new()
        .with_config(config.clone())
        .analyze(selection, index, snapshot)
}
