use crate::bucket::{distance, BucketKey, Bucketer};
use crate::signature::StructuralSignature;
use frameticket_common::ScanConfig;
use frameticket_core::{Color, Node, SnapshotId, StyleCategory, StyleValue};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// An inferred design token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignToken {
    /// Category plus rank, e.g. `color-1` for the most used color.
    pub id: String,
    pub category: StyleCategory,
    pub key: BucketKey,
    pub value: StyleValue,
    pub usage_count: usize,
    pub node_ids: BTreeSet<String>,
}

/// A cluster of subtrees with identical signatures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferredComponent {
    pub id: String,
    /// Layer name of the first member.
    pub name: String,
    pub signature: StructuralSignature,
    /// Member node ids, in document order.
    pub member_ids: Vec<String>,
    pub confidence: f64,
}

impl InferredComponent {
    pub fn confidence_for(members: usize) -> f64 {
        members as f64 / (members as f64 + 1.0)
    }
}

/// Everything one scan inferred about a snapshot. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanIndex {
    pub snapshot_id: SnapshotId,
    pub node_count: usize,
    pub tokens: Vec<DesignToken>,
    pub components: Vec<InferredComponent>,
    pub config: ScanConfig,
    palette: Vec<Color>,
    #[serde(skip)]
    bucketer: Bucketer,
    #[serde(skip)]
    by_signature: HashMap<StructuralSignature, usize>,
    #[serde(skip)]
    by_member: HashMap<String, usize>,
}

impl ScanIndex {
    pub(crate) fn new(
        snapshot_id: SnapshotId,
        node_count: usize,
        tokens: Vec<DesignToken>,
        components: Vec<InferredComponent>,
        config: ScanConfig,
        palette: Vec<Color>,
    ) -> Self {
        let mut by_signature = HashMap::with_capacity(components.len());
        let mut by_member = HashMap::new();
        for (i, component) in components.iter().enumerate() {
            by_signature.insert(component.signature.clone(), i);
            for member in &component.member_ids {
                by_member.insert(member.clone(), i);
            }
        }
        let bucketer = Bucketer::with_palette(config.clone(), palette.clone());
        Self {
            snapshot_id,
            node_count,
            tokens,
            components,
            config,
            palette,
            bucketer,
            by_signature,
            by_member,
        }
    }

    pub(crate) fn empty(snapshot_id: SnapshotId, node_count: usize, config: ScanConfig) -> Self {
        Self::new(snapshot_id, node_count, Vec::new(), Vec::new(), config, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.components.is_empty()
    }

    pub fn palette(&self) -> &[Color] {
        &self.palette
    }

    pub fn tokens_for(&self, category: StyleCategory) -> impl Iterator<Item = &DesignToken> {
        self.tokens.iter().filter(move |t| t.category == category)
    }

    pub fn has_tokens_for(&self, category: StyleCategory) -> bool {
        self.tokens_for(category).next().is_some()
    }

    /// Closest token of the value's category. Ties keep the higher ranked token.
    pub fn nearest_token(&self, value: &StyleValue) -> Option<(&DesignToken, f64)> {
        let mut best: Option<(&DesignToken, f64)> = None;
        for token in self.tokens_for(value.category()) {
            let Some(d) = distance(value, &token.value) else {
                continue;
            };
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((token, d));
            }
        }
        best
    }

    /// Token whose bucket the value falls into, if that bucket became a token.
    pub fn token_for(&self, value: &StyleValue) -> Option<&DesignToken> {
        let key = self.bucketer.lookup(value);
        self.tokens.iter().find(|t| t.key == key)
    }

    pub fn component(&self, id: &str) -> Option<&InferredComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn component_for_member(&self, node_id: &str) -> Option<&InferredComponent> {
        self.by_member.get(node_id).map(|&i| &self.components[i])
    }

    pub fn component_for_signature(
        &self,
        signature: &StructuralSignature,
    ) -> Option<&InferredComponent> {
        self.by_signature.get(signature).map(|&i| &self.components[i])
    }

    /// Signature of any node, bucketed against this scan's palette.
    pub fn signature_of(&self, node: &Node) -> StructuralSignature {
        signature_with(&self.bucketer, node)
    }
}

/// Signature of `node` with keys taken from a frozen bucketer.
pub(crate) fn signature_with(bucketer: &Bucketer, node: &Node) -> StructuralSignature {
    StructuralSignature {
        kind: node.kind,
        child_kinds: node.child_kinds(),
        style: node
            .style
            .iter()
            .map(|(property, value)| (property.clone(), bucketer.lookup(value)))
            .collect(),
    }
}
