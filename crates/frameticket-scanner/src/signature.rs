use crate::bucket::BucketKey;
use frameticket_core::NodeKind;
use serde::{Deserialize, Serialize};

/// Structural signature of a subtree: its kind, the kinds of its direct children,
/// and its bucketed style attributes (ordered by property name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructuralSignature {
    pub kind: NodeKind,
    pub child_kinds: Vec<NodeKind>,
    pub style: Vec<(String, BucketKey)>,
}

impl StructuralSignature {
    /// Same kind and same child-kind sequence, style aside.
    pub fn same_structure(&self, other: &StructuralSignature) -> bool {
        self.kind == other.kind && self.child_kinds == other.child_kinds
    }

    /// Similarity of the child-kind sequences in [0, 1]; 0 for different kinds.
    pub fn structure_similarity(&self, other: &StructuralSignature) -> f64 {
        if self.kind != other.kind {
            return 0.0;
        }
        let longest = self.child_kinds.len().max(other.child_kinds.len());
        if longest == 0 {
            return 1.0;
        }
        let edits = edit_distance(&self.child_kinds, &other.child_kinds);
        1.0 - edits as f64 / longest as f64
    }

    pub fn describe(&self) -> String {
        let children: Vec<&str> = self.child_kinds.iter().map(NodeKind::as_str).collect();
        format!("{}[{}]", self.kind, children.join(","))
    }
}

/// Levenshtein distance over kind sequences.
fn edit_distance(a: &[NodeKind], b: &[NodeKind]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ka) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, kb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ka != kb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
