use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node kinds the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Frame,
    Group,
    ComponentInstance,
    Text,
    Vector,
    Shape,
}

impl NodeKind {
    /// Map a host layer type (`FRAME`, `component_instance`, `RECTANGLE`, ...) to a kind.
    pub fn from_host_type(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "frame" | "component" | "component-set" | "section" => Some(NodeKind::Frame),
            "group" | "boolean-operation" => Some(NodeKind::Group),
            "instance" | "component-instance" => Some(NodeKind::ComponentInstance),
            "text" => Some(NodeKind::Text),
            "vector" => Some(NodeKind::Vector),
            "shape" | "rectangle" | "ellipse" | "line" | "polygon" | "star" => {
                Some(NodeKind::Shape)
            }
            _ => None,
        }
    }

    /// Kinds that can be instances of a reusable component.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Frame | NodeKind::Group | NodeKind::ComponentInstance
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Frame => "frame",
            NodeKind::Group => "group",
            NodeKind::ComponentInstance => "component-instance",
            NodeKind::Text => "text",
            NodeKind::Vector => "vector",
            NodeKind::Shape => "shape",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Style categories; every [`StyleValue`] belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleCategory {
    Color,
    Spacing,
    Typography,
    Radius,
    Shadow,
}

impl StyleCategory {
    pub const ALL: [StyleCategory; 5] = [
        StyleCategory::Color,
        StyleCategory::Spacing,
        StyleCategory::Typography,
        StyleCategory::Radius,
        StyleCategory::Shadow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleCategory::Color => "color",
            StyleCategory::Spacing => "spacing",
            StyleCategory::Typography => "typography",
            StyleCategory::Radius => "radius",
            StyleCategory::Shadow => "shadow",
        }
    }

    /// Classify a host style property name.
    pub fn for_property(property: &str) -> Option<Self> {
        let p = property.trim().to_ascii_lowercase();
        match p.as_str() {
            "fill" | "fills" | "stroke" | "strokes" | "background" | "backgroundcolor"
            | "color" | "textcolor" | "bordercolor" => Some(StyleCategory::Color),
            "gap" | "itemspacing" | "counteraxisspacing" => Some(StyleCategory::Spacing),
            "cornerradius" | "radius" | "borderradius" => Some(StyleCategory::Radius),
            "font" | "textstyle" | "typography" => Some(StyleCategory::Typography),
            "shadow" | "dropshadow" | "boxshadow" => Some(StyleCategory::Shadow),
            _ if p.starts_with("padding") || p.starts_with("margin") => {
                Some(StyleCategory::Spacing)
            }
            _ => None,
        }
    }
}

impl fmt::Display for StyleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().strip_prefix('#')?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let expand = |c: char| channel(&format!("{c}{c}"));
                let mut chars = hex.chars();
                Some(Self::rgb(
                    expand(chars.next()?)?,
                    expand(chars.next()?)?,
                    expand(chars.next()?)?,
                ))
            }
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            8 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
                a: channel(&hex[6..8])?,
            }),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Euclidean distance over the RGBA channels.
    pub fn distance(&self, other: &Color) -> f64 {
        let d = |a: u8, b: u8| (a as f64 - b as f64).powi(2);
        (d(self.r, other.r) + d(self.g, other.g) + d(self.b, other.b) + d(self.a, other.a)).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Typography {
    pub family: String,
    pub size: f64,
    pub weight: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub x: f64,
    pub y: f64,
    pub blur: f64,
    pub color: Color,
}

/// A typed style attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "value", rename_all = "snake_case")]
pub enum StyleValue {
    Color(Color),
    Spacing(f64),
    Typography(Typography),
    Radius(f64),
    Shadow(Shadow),
}

impl StyleValue {
    pub fn category(&self) -> StyleCategory {
        match self {
            StyleValue::Color(_) => StyleCategory::Color,
            StyleValue::Spacing(_) => StyleCategory::Spacing,
            StyleValue::Typography(_) => StyleCategory::Typography,
            StyleValue::Radius(_) => StyleCategory::Radius,
            StyleValue::Shadow(_) => StyleCategory::Shadow,
        }
    }

    /// Short human readable form used in reports and prompts.
    pub fn describe(&self) -> String {
        match self {
            StyleValue::Color(c) => c.to_hex(),
            StyleValue::Spacing(v) => format!("{}px", v),
            StyleValue::Radius(v) => format!("r{}", v),
            StyleValue::Typography(t) => format!("{} {}/{}", t.family, t.size, t.weight),
            StyleValue::Shadow(s) => {
                format!("{} {} {} {}", s.x, s.y, s.blur, s.color.to_hex())
            }
        }
    }
}

/// One element of the normalized design tree. Children are owned; there is no sharing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub geometry: Geometry,
    pub style: BTreeMap<String, StyleValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
    /// Id of the defining component, when the host knows it. Lookup only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_ref: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind,
            geometry: Geometry::default(),
            style: BTreeMap::new(),
            text: None,
            children: Vec::new(),
            component_ref: None,
        }
    }

    /// Pre-order traversal, starting with `self`.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Levels in the subtree, `self` counting as 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, level)) = stack.pop() {
            deepest = deepest.max(level);
            stack.extend(node.children.iter().map(|c| (c, level + 1)));
        }
        deepest
    }

    pub fn child_kinds(&self) -> Vec<NodeKind> {
        self.children.iter().map(|c| c.kind).collect()
    }
}

/// Document-order iterator over a subtree
pub struct PreOrder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_type_mapping() {
        assert_eq!(NodeKind::from_host_type("FRAME"), Some(NodeKind::Frame));
        assert_eq!(
            NodeKind::from_host_type("COMPONENT_INSTANCE"),
            Some(NodeKind::ComponentInstance)
        );
        assert_eq!(NodeKind::from_host_type("RECTANGLE"), Some(NodeKind::Shape));
        assert_eq!(NodeKind::from_host_type("sticky"), None);
    }

    #[test]
    fn test_property_classification() {
        assert_eq!(StyleCategory::for_property("fill"), Some(StyleCategory::Color));
        assert_eq!(StyleCategory::for_property("paddingLeft"), Some(StyleCategory::Spacing));
        assert_eq!(StyleCategory::for_property("cornerRadius"), Some(StyleCategory::Radius));
        assert_eq!(StyleCategory::for_property("opacity"), None);
    }

    #[test]
    fn test_hex_colors() {
        assert_eq!(Color::from_hex("#fff"), Some(Color::rgb(255, 255, 255)));
        assert_eq!(Color::from_hex("#E53935"), Some(Color::rgb(0xe5, 0x39, 0x35)));
        assert_eq!(Color::from_hex("#00000080").map(|c| c.a), Some(0x80));
        assert_eq!(Color::from_hex("e53935"), None);
        assert_eq!(Color::from_hex("#zzzzzz"), None);
        assert_eq!(Color::rgb(1, 2, 3).to_hex(), "#010203");
    }

    #[test]
    fn test_preorder_is_document_order() {
        let mut root = Node::new("root", NodeKind::Frame);
        let mut a = Node::new("a", NodeKind::Group);
        a.children.push(Node::new("a1", NodeKind::Text));
        root.children.push(a);
        root.children.push(Node::new("b", NodeKind::Shape));

        let ids: Vec<&str> = root.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "a1", "b"]);
        assert_eq!(root.depth(), 3);
        assert_eq!(root.count(), 4);
    }
}
