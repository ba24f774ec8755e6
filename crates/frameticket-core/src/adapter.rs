use crate::snapshot::DocumentSnapshot;
use crate::types::*;
use frameticket_common::{FrameTicketError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Document as exported by the host integration: a flat node table plus a root id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub root: String,
    pub nodes: Vec<RawNode>,
}

/// A host node. Children are referenced by id, so the table may describe a graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub style: BTreeMap<String, Value>,
    #[serde(default)]
    pub characters: Option<String>,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Copy a raw host document into an owned, acyclic [`Node`] tree.
pub fn normalize(raw: &RawDocument) -> Result<Node> {
    let mut table: HashMap<&str, &RawNode> = HashMap::with_capacity(raw.nodes.len());
    for node in &raw.nodes {
        if table.insert(node.id.as_str(), node).is_some() {
            return Err(malformed(format!("duplicate node id '{}'", node.id)));
        }
    }

    if !table.contains_key(raw.root.as_str()) {
        return Err(malformed(format!("root '{}' is not in the node table", raw.root)));
    }

    let mut builder = TreeBuilder {
        table: &table,
        ancestors: Vec::new(),
        visited: HashSet::new(),
    };
    let root = builder.build(&raw.root)?;

    let unreachable = raw.nodes.len() - builder.visited.len();
    if unreachable > 0 {
        debug!("{} nodes unreachable from root '{}' were ignored", unreachable, raw.root);
    }

    Ok(root)
}

/// [`normalize`] and tag the result with its snapshot id.
pub fn normalize_snapshot(raw: &RawDocument) -> Result<DocumentSnapshot> {
    let root = normalize(raw)?;
    let snapshot = DocumentSnapshot::new(root);
    info!(
        "Normalized snapshot {} with {} nodes",
        snapshot.id(),
        snapshot.node_count()
    );
    Ok(snapshot)
}

/// Deepest tree [`normalize`] accepts, counting the root as level 1.
pub const MAX_TREE_DEPTH: usize = 256;

/// A node under construction and the next child to visit.
struct Frame<'a> {
    raw: &'a RawNode,
    next_child: usize,
    node: Node,
}

struct TreeBuilder<'a> {
    table: &'a HashMap<&'a str, &'a RawNode>,
    ancestors: Vec<&'a str>,
    visited: HashSet<&'a str>,
}

impl<'a> TreeBuilder<'a> {
    /// Depth-first build on an explicit stack; a node is attached to its
    /// parent once all of its children are done.
    fn build(&mut self, root_id: &'a str) -> Result<Node> {
        let mut stack = vec![self.enter(root_id)?];
        loop {
            let Some(frame) = stack.last_mut() else {
                return Err(malformed("empty build stack".to_string()));
            };

            let raw = frame.raw;
            if let Some(child_id) = raw.children.get(frame.next_child) {
                frame.next_child += 1;
                if stack.len() >= MAX_TREE_DEPTH {
                    return Err(malformed(format!(
                        "tree is deeper than {} levels at '{}'",
                        MAX_TREE_DEPTH, child_id
                    )));
                }
                let child = self.enter(child_id.as_str())?;
                stack.push(child);
                continue;
            }

            let Some(done) = stack.pop() else {
                return Err(malformed("empty build stack".to_string()));
            };
            self.ancestors.pop();
            match stack.last_mut() {
                Some(parent) => parent.node.children.push(done.node),
                None => return Ok(done.node),
            }
        }
    }

    fn enter(&mut self, id: &'a str) -> Result<Frame<'a>> {
        if self.ancestors.contains(&id) {
            return Err(malformed(format!(
                "cycle: '{}' is its own ancestor via {}",
                id,
                self.ancestors.join(" > ")
            )));
        }
        if !self.visited.insert(id) {
            return Err(malformed(format!("node '{}' has more than one parent", id)));
        }

        let raw = *self
            .table
            .get(id)
            .ok_or_else(|| malformed(format!("child '{}' is not in the node table", id)))?;

        let kind_name = raw
            .kind
            .as_deref()
            .ok_or_else(|| malformed(format!("node '{}' has no type", id)))?;
        let kind = NodeKind::from_host_type(kind_name)
            .ok_or_else(|| malformed(format!("node '{}' has unknown type '{}'", id, kind_name)))?;

        let geometry = Geometry {
            x: require(raw.x, id, "x")?,
            y: require(raw.y, id, "y")?,
            width: require(raw.width, id, "width")?,
            height: require(raw.height, id, "height")?,
        };

        let style = normalize_style(id, &raw.style)?;

        self.ancestors.push(id);
        Ok(Frame {
            raw,
            next_child: 0,
            node: Node {
                id: raw.id.clone(),
                name: raw.name.clone(),
                kind,
                geometry,
                style,
                text: raw.characters.clone(),
                children: Vec::with_capacity(raw.children.len()),
                component_ref: raw.component_id.clone(),
            },
        })
    }
}

fn require(value: Option<f64>, id: &str, field: &str) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(malformed(format!("node '{}' has non-finite {} ({})", id, field, v))),
        None => Err(malformed(format!("node '{}' is missing geometry field '{}'", id, field))),
    }
}

fn malformed(message: String) -> FrameTicketError {
    FrameTicketError::MalformedTree(message)
}

fn normalize_style(id: &str, raw: &BTreeMap<String, Value>) -> Result<BTreeMap<String, StyleValue>> {
    let mut style = BTreeMap::new();
    for (property, value) in raw {
        let Some(category) = StyleCategory::for_property(property) else {
            debug!("Dropping unsupported style property '{}' on '{}'", property, id);
            continue;
        };
        if value.is_null() {
            continue;
        }
        let parsed = parse_style_value(category, value).ok_or_else(|| {
            malformed(format!(
                "node '{}' has an invalid {} value for '{}': {}",
                id, category, property, value
            ))
        })?;
        style.insert(property.clone(), parsed);
    }
    Ok(style)
}

fn parse_style_value(category: StyleCategory, value: &Value) -> Option<StyleValue> {
    // Host paint lists: the top-most paint wins.
    if let Value::Array(items) = value {
        return parse_style_value(category, items.first()?);
    }

    match category {
        StyleCategory::Color => parse_color(value).map(StyleValue::Color),
        StyleCategory::Spacing => non_negative(value).map(StyleValue::Spacing),
        StyleCategory::Radius => non_negative(value).map(StyleValue::Radius),
        StyleCategory::Typography => {
            let family = field(value, &["family", "fontFamily"])?.as_str()?.to_string();
            let size = field(value, &["size", "fontSize"])?.as_f64()?;
            let weight = match field(value, &["weight", "fontWeight"]) {
                Some(w) => w.as_f64()?.round().clamp(1.0, 1000.0) as u16,
                None => 400,
            };
            (size > 0.0).then_some(StyleValue::Typography(Typography {
                family,
                size,
                weight,
            }))
        }
        StyleCategory::Shadow => Some(StyleValue::Shadow(Shadow {
            x: field(value, &["x", "offsetX"]).and_then(Value::as_f64).unwrap_or(0.0),
            y: field(value, &["y", "offsetY"]).and_then(Value::as_f64).unwrap_or(0.0),
            blur: field(value, &["blur", "radius"])?.as_f64()?,
            color: match field(value, &["color"]) {
                Some(c) => parse_color(c)?,
                None => Color { r: 0, g: 0, b: 0, a: 64 },
            },
        })),
    }
}

fn field<'v>(value: &'v Value, names: &[&str]) -> Option<&'v Value> {
    names.iter().find_map(|name| value.get(*name))
}

fn non_negative(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_color(value: &Value) -> Option<Color> {
    match value {
        Value::String(s) => Color::from_hex(s),
        Value::Object(map) => {
            // Paint objects wrap the actual color.
            if let Some(inner) = map.get("color") {
                return parse_color(inner);
            }
            let r = map.get("r")?.as_f64()?;
            let g = map.get("g")?.as_f64()?;
            let b = map.get("b")?.as_f64()?;
            let a = map.get("a").and_then(Value::as_f64).unwrap_or(1.0);
            let unit = r <= 1.0 && g <= 1.0 && b <= 1.0;
            let channel = |v: f64| {
                let scaled = if unit { v * 255.0 } else { v };
                scaled.round().clamp(0.0, 255.0) as u8
            };
            Some(Color {
                r: channel(r),
                g: channel(g),
                b: channel(b),
                a: (a.clamp(0.0, 1.0) * 255.0).round() as u8,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> RawDocument {
        serde_json::from_value(value).unwrap()
    }

    fn frame(id: &str, children: &[&str]) -> Value {
        json!({ "id": id, "type": "FRAME", "name": id, "x": 0, "y": 0, "width": 10, "height": 10, "children": children })
    }

    #[test]
    fn test_normalize_builds_owned_tree() {
        let raw = doc(json!({
            "root": "page",
            "nodes": [
                frame("page", &["btn"]),
                {
                    "id": "btn", "type": "INSTANCE", "name": "Button",
                    "x": 4, "y": 4, "width": 120, "height": 40,
                    "componentId": "cmp-button",
                    "style": {
                        "fill": "#E53935",
                        "cornerRadius": 8,
                        "paddingLeft": 16,
                        "opacity": 0.5
                    },
                    "children": ["label"]
                },
                {
                    "id": "label", "type": "TEXT", "name": "Label",
                    "x": 8, "y": 8, "width": 60, "height": 20,
                    "characters": "Submit",
                    "style": {
                        "fill": { "r": 1, "g": 1, "b": 1 },
                        "font": { "family": "Inter", "size": 14, "weight": 600 }
                    }
                }
            ]
        }));

        let root = normalize(&raw).unwrap();
        assert_eq!(root.children.len(), 1);
        let button = &root.children[0];
        assert_eq!(button.kind, NodeKind::ComponentInstance);
        assert_eq!(button.component_ref.as_deref(), Some("cmp-button"));
        assert_eq!(button.style.len(), 3, "opacity is not a supported category");
        assert_eq!(
            button.style.get("fill"),
            Some(&StyleValue::Color(Color::rgb(0xe5, 0x39, 0x35)))
        );

        let label = &button.children[0];
        assert_eq!(label.text.as_deref(), Some("Submit"));
        assert_eq!(
            label.style.get("fill"),
            Some(&StyleValue::Color(Color::rgb(255, 255, 255)))
        );
        assert!(matches!(
            label.style.get("font"),
            Some(StyleValue::Typography(t)) if t.weight == 600 && t.family == "Inter"
        ));
    }

    #[test]
    fn test_cycle_is_malformed() {
        let raw = doc(json!({
            "root": "a",
            "nodes": [frame("a", &["b"]), frame("b", &["a"])]
        }));
        let err = normalize(&raw).unwrap_err();
        assert!(matches!(err, FrameTicketError::MalformedTree(ref m) if m.contains("cycle")));
    }

    #[test]
    fn test_shared_child_is_malformed() {
        let raw = doc(json!({
            "root": "a",
            "nodes": [frame("a", &["b", "c"]), frame("b", &["c"]), frame("c", &[])]
        }));
        assert!(matches!(
            normalize(&raw),
            Err(FrameTicketError::MalformedTree(_))
        ));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let no_kind = doc(json!({
            "root": "a",
            "nodes": [{ "id": "a", "x": 0, "y": 0, "width": 1, "height": 1 }]
        }));
        assert!(normalize(&no_kind).is_err());

        let no_geometry = doc(json!({
            "root": "a",
            "nodes": [{ "id": "a", "type": "FRAME", "x": 0, "y": 0, "width": 1 }]
        }));
        let err = normalize(&no_geometry).unwrap_err();
        assert!(err.to_string().contains("height"));

        let missing_child = doc(json!({ "root": "a", "nodes": [frame("a", &["ghost"])] }));
        assert!(normalize(&missing_child).is_err());

        let missing_root = doc(json!({ "root": "zzz", "nodes": [frame("a", &[])] }));
        assert!(normalize(&missing_root).is_err());
    }

    #[test]
    fn test_invalid_known_style_is_malformed() {
        let raw = doc(json!({
            "root": "a",
            "nodes": [{
                "id": "a", "type": "RECTANGLE", "x": 0, "y": 0, "width": 1, "height": 1,
                "style": { "fill": "red" }
            }]
        }));
        assert!(matches!(
            normalize(&raw),
            Err(FrameTicketError::MalformedTree(m)) if m.contains("fill")
        ));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = doc(json!({
            "root": "a",
            "nodes": [frame("a", &["b"]), frame("b", &[])]
        }));
        assert_eq!(normalize(&raw).unwrap(), normalize(&raw).unwrap());
        assert_eq!(
            normalize_snapshot(&raw).unwrap().id(),
            normalize_snapshot(&raw).unwrap().id()
        );
    }

    fn chain(len: usize) -> RawDocument {
        let ids: Vec<String> = (0..len).map(|i| format!("n{i}")).collect();
        let nodes: Vec<Value> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| match ids.get(i + 1) {
                Some(next) => frame(id, &[next.as_str()]),
                None => frame(id, &[]),
            })
            .collect();
        doc(json!({ "root": "n0", "nodes": nodes }))
    }

    #[test]
    fn test_deepest_allowed_chain() {
        let snapshot = normalize_snapshot(&chain(MAX_TREE_DEPTH)).unwrap();
        assert_eq!(snapshot.root().depth(), MAX_TREE_DEPTH);
        assert_eq!(snapshot.node_count(), MAX_TREE_DEPTH);
        let last = format!("n{}", MAX_TREE_DEPTH - 1);
        assert_eq!(snapshot.position(&last), Some(MAX_TREE_DEPTH - 1));
        assert!(snapshot.node(&last).unwrap().children.is_empty());
    }

    #[test]
    fn test_too_deep_is_malformed() {
        for len in [MAX_TREE_DEPTH + 1, 5_000] {
            let err = normalize(&chain(len)).unwrap_err();
            assert!(
                matches!(err, FrameTicketError::MalformedTree(ref m) if m.contains("deeper than")),
                "{len}: {err}"
            );
        }
    }
}
