use crate::quality::ContextQualityReport;
use frameticket_analyzer::ComplianceReport;
use frameticket_common::ErrorKind;
use frameticket_core::{NodeKind, SnapshotId, StyleCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Text appended to anything the budget cut short.
pub const TRUNCATION_MARKER: &str = "[truncated]";

/// Metadata the caller supplies alongside each batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerMetadata {
    /// Free-form tech stack, e.g. "React + TypeScript, Tailwind".
    pub tech_stack: Option<String>,
    /// Link template with `{node_id}` and optionally `{file_key}` placeholders.
    pub frame_link_template: Option<String>,
    pub file_key: Option<String>,
    /// Template for a visual reference placeholder, same placeholders as the link.
    pub visual_reference_template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSummary {
    pub node_count: usize,
    pub depth: usize,
    pub kinds: BTreeMap<NodeKind, usize>,
    /// One indented line per node, in document order.
    pub outline: Vec<String>,
    pub layer_names: Vec<String>,
    pub empty_text_nodes: usize,
    /// Inferred components the selection instantiates.
    pub components: Vec<String>,
}

/// How often one style value appears in the selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleUsage {
    pub category: StyleCategory,
    pub value: String,
    /// Token the value belongs to, when it is on-system.
    pub token: Option<String>,
    pub count: usize,
}

/// What the payload budget cut from a package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Truncation {
    pub omitted_chars: usize,
    pub omitted_nodes: usize,
    pub omitted_styles: usize,
    pub omitted_violations: usize,
}

impl Truncation {
    pub fn is_empty(&self) -> bool {
        *self == Truncation::default()
    }
}

/// A context package before quality scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDraft {
    pub selection_index: usize,
    pub snapshot_id: SnapshotId,
    /// Selected ids in document order.
    pub node_ids: Vec<String>,
    pub text: String,
    pub text_entries: Vec<String>,
    pub structure: StructureSummary,
    pub styles: Vec<StyleUsage>,
    pub visual_reference: Option<String>,
    pub tech_stack: Option<String>,
    pub frame_link: Option<String>,
    pub compliance: Option<ComplianceReport>,
    pub truncation: Option<Truncation>,
}

/// Everything one ticket-generation request consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPackage {
    #[serde(flatten)]
    pub content: ContextDraft,
    pub quality: ContextQualityReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result for one selection of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PackageOutcome {
    Ready(Box<ContextPackage>),
    Failed(ErrorDescriptor),
    Cancelled { index: usize },
}

impl PackageOutcome {
    pub fn package(&self) -> Option<&ContextPackage> {
        match self {
            PackageOutcome::Ready(package) => Some(package),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDescriptor> {
        match self {
            PackageOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PackageOutcome::Ready(_))
    }
}
