use crate::types::{Geometry, Node, NodeKind, StyleValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

/// Identifier of one immutable document snapshot.
///
/// Derived from the content of the normalized tree (UUID v5 over the canonical JSON
/// of each node in document order), so re-normalizing an unchanged document yields
/// the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn for_tree(root: &Node) -> Self {
        let mut canonical = Vec::new();
        for node in root.iter() {
            let record = NodeRecord {
                id: &node.id,
                name: &node.name,
                kind: node.kind,
                geometry: &node.geometry,
                style: &node.style,
                text: node.text.as_deref(),
                component_ref: node.component_ref.as_deref(),
                children: node.children.len(),
            };
            // Flat records of plain fields and string keys always serialize.
            canonical.extend(serde_json::to_vec(&record).unwrap_or_default());
            canonical.push(b'\n');
        }
        SnapshotId(Uuid::new_v5(&Uuid::NAMESPACE_OID, &canonical).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One node without its subtree; the pre-order stream of these fixes the tree.
#[derive(Serialize)]
struct NodeRecord<'a> {
    id: &'a str,
    name: &'a str,
    kind: NodeKind,
    geometry: &'a Geometry,
    style: &'a BTreeMap<String, StyleValue>,
    text: Option<&'a str>,
    component_ref: Option<&'a str>,
    children: usize,
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized tree tagged with its snapshot id, plus an id → position lookup.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    id: SnapshotId,
    root: Node,
    /// Child-index path from the root, per node id.
    paths: HashMap<String, Vec<usize>>,
    /// Pre-order position, per node id.
    positions: HashMap<String, usize>,
}

impl DocumentSnapshot {
    pub fn new(root: Node) -> Self {
        let id = SnapshotId::for_tree(&root);
        let mut paths = HashMap::new();
        let mut positions = HashMap::new();
        index_paths(&root, &mut paths, &mut positions);
        Self {
            id,
            root,
            paths,
            positions,
        }
    }

    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.positions.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        let path = self.paths.get(node_id)?;
        let mut node = &self.root;
        for &index in path {
            node = node.children.get(index)?;
        }
        Some(node)
    }

    /// Pre-order position of a node, used to put selections in document order.
    pub fn position(&self, node_id: &str) -> Option<usize> {
        self.positions.get(node_id).copied()
    }
}

fn index_paths(
    root: &Node,
    paths: &mut HashMap<String, Vec<usize>>,
    positions: &mut HashMap<String, usize>,
) {
    let mut stack: Vec<(&Node, Vec<usize>)> = vec![(root, Vec::new())];
    while let Some((node, path)) = stack.pop() {
        let position = positions.len();
        positions.insert(node.id.clone(), position);
        for (index, child) in node.children.iter().enumerate().rev() {
            let mut child_path = path.clone();
            child_path.push(index);
            stack.push((child, child_path));
        }
        paths.insert(node.id.clone(), path);
    }
}

/// A set of selected node ids. Order of insertion is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    pub node_ids: BTreeSet<String>,
}

impl Selection {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }
}
