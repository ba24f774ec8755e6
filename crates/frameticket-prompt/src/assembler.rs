use crate::deduplication::DeduplicationEngine;
use crate::pruner::PayloadPruner;
use crate::quality::QualityScorer;
use crate::types::{
    CallerMetadata, ContextDraft, ContextPackage, ErrorDescriptor, PackageOutcome,
    StructureSummary, StyleUsage,
};
use frameticket_analyzer::ComplianceAnalyzer;
use frameticket_common::{EngineConfig, ErrorKind, FrameTicketError, Result};
use frameticket_core::{DocumentSnapshot, Node, NodeKind, Selection};
use frameticket_scanner::ScanIndex;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation shared between a caller and a running batch.
/// Checked before each selection starts; work in flight runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builds context packages for batches of selections
pub struct ContextAssembler {
    config: EngineConfig,
    analyzer: ComplianceAnalyzer,
    scorer: QualityScorer,
    pruner: PayloadPruner,
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            analyzer: ComplianceAnalyzer::new().with_config(config.compliance.clone()),
            scorer: QualityScorer::new().with_config(config.quality.clone()),
            pruner: PayloadPruner::new(&config.limits),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One outcome per selection, in input order. A failing selection never
    /// affects its neighbours.
    pub fn assemble(
        &self,
        selections: &[Selection],
        index: &ScanIndex,
        snapshot: &DocumentSnapshot,
        metadata: &CallerMetadata,
        cancel: &CancellationFlag,
    ) -> Vec<PackageOutcome> {
        self.assemble_with_progress(selections, index, snapshot, metadata, cancel, |_| {})
    }

    /// [`assemble`](Self::assemble), calling `on_outcome` as each outcome is committed.
    /// Raising `cancel` from the callback stops the batch before the next selection.
    pub fn assemble_with_progress<F>(
        &self,
        selections: &[Selection],
        index: &ScanIndex,
        snapshot: &DocumentSnapshot,
        metadata: &CallerMetadata,
        cancel: &CancellationFlag,
        mut on_outcome: F,
    ) -> Vec<PackageOutcome>
    where
        F: FnMut(&PackageOutcome),
    {
        let start = Instant::now();
        info!("📦 Assembling {} context packages", selections.len());

        let mut outcomes = Vec::with_capacity(selections.len());
        for (i, selection) in selections.iter().enumerate() {
            let outcome = self.outcome_for(i, selection, index, snapshot, metadata, cancel);
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        log_summary(&outcomes, start);
        outcomes
    }

    /// Assemble a single selection; `position` is its place in the batch.
    pub fn assemble_one(
        &self,
        position: usize,
        selection: &Selection,
        index: &ScanIndex,
        snapshot: &DocumentSnapshot,
        metadata: &CallerMetadata,
    ) -> Result<ContextPackage> {
        let compliance = self.analyzer.analyze(selection, index, snapshot)?;

        let roots = selected_roots(selection, snapshot)?;
        let mut draft = build_draft(position, &roots, index, snapshot, metadata);
        draft.compliance = Some(compliance);

        DeduplicationEngine::deduplicate(&mut draft);
        self.pruner.prune(&mut draft);
        let quality = self.scorer.score(&draft);

        debug!(
            "Selection {} assembled: {} nodes, {} text entries, quality {:.1}",
            position, draft.structure.node_count, draft.text_entries.len(), quality.score
        );

        Ok(ContextPackage {
            content: draft,
            quality,
        })
    }

    fn outcome_for(
        &self,
        position: usize,
        selection: &Selection,
        index: &ScanIndex,
        snapshot: &DocumentSnapshot,
        metadata: &CallerMetadata,
        cancel: &CancellationFlag,
    ) -> PackageOutcome {
        if cancel.is_cancelled() {
            debug!("Selection {} skipped: batch cancelled", position);
            return PackageOutcome::Cancelled { index: position };
        }
        match self.assemble_one(position, selection, index, snapshot, metadata) {
            Ok(package) => PackageOutcome::Ready(Box::new(package)),
            Err(e) => {
                warn!("Selection {} failed: {}", position, e);
                PackageOutcome::Failed(describe(position, &e))
            }
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a batch with an explicit configuration.
pub fn assemble(
    selections: &[Selection],
    index: &ScanIndex,
    snapshot: &DocumentSnapshot,
    metadata: &CallerMetadata,
    config: &EngineConfig,
    cancel: &CancellationFlag,
) -> Vec<PackageOutcome> {
    ContextAssembler::with_config(config.clone()).assemble(selections, index, snapshot, metadata, cancel)
}

/// Like [`assemble`], but selections run on blocking workers with at most
/// `limits.max_parallel` in flight. Outcomes keep input order.
pub async fn assemble_concurrent(
    selections: Vec<Selection>,
    index: Arc<ScanIndex>,
    snapshot: Arc<DocumentSnapshot>,
    metadata: CallerMetadata,
    config: EngineConfig,
    cancel: CancellationFlag,
) -> Vec<PackageOutcome> {
    let start = Instant::now();
    let concurrency = config.limits.max_parallel.max(1);
    info!(
        "📦 Assembling {} context packages ({} workers)",
        selections.len(),
        concurrency
    );

    let assembler = Arc::new(ContextAssembler::with_config(config));
    let metadata = Arc::new(metadata);

    let outcomes: Vec<PackageOutcome> = stream::iter(selections.into_iter().enumerate())
        .map(|(i, selection)| {
            let assembler = assembler.clone();
            let index = index.clone();
            let snapshot = snapshot.clone();
            let metadata = metadata.clone();
            let cancel = cancel.clone();
            async move {
                let worker = tokio::task::spawn_blocking(move || {
                    assembler.outcome_for(i, &selection, &index, &snapshot, &metadata, &cancel)
                });
                match worker.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Selection {} worker failed: {}", i, e);
                        PackageOutcome::Failed(ErrorDescriptor {
                            index: i,
                            kind: ErrorKind::Generic,
                            message: format!("worker failed: {}", e),
                        })
                    }
                }
            }
        })
        .buffered(concurrency)
        .collect()
        .await;

    log_summary(&outcomes, start);
    outcomes
}

fn describe(position: usize, error: &FrameTicketError) -> ErrorDescriptor {
    ErrorDescriptor {
        index: position,
        kind: error.kind(),
        message: error.to_string(),
    }
}

fn log_summary(outcomes: &[PackageOutcome], start: Instant) {
    let ready = outcomes.iter().filter(|o| o.is_ready()).count();
    let failed = outcomes.iter().filter(|o| o.error().is_some()).count();
    let cancelled = outcomes.len() - ready - failed;
    info!(
        "✅ Batch done in {:?}: {} ready, {} failed, {} cancelled",
        start.elapsed(),
        ready,
        failed,
        cancelled
    );
}

/// Selected nodes in document order, minus any already inside an earlier pick.
fn selected_roots<'s>(selection: &Selection, snapshot: &'s DocumentSnapshot) -> Result<Vec<&'s Node>> {
    let mut picked = Vec::with_capacity(selection.len());
    for id in &selection.node_ids {
        let node = snapshot
            .node(id)
            .ok_or_else(|| FrameTicketError::NodeNotFound(id.clone()))?;
        picked.push(node);
    }
    picked.sort_by_key(|n| snapshot.position(&n.id).unwrap_or(usize::MAX));

    let mut covered: HashSet<&str> = HashSet::new();
    let mut roots = Vec::with_capacity(picked.len());
    for node in picked {
        if covered.contains(node.id.as_str()) {
            continue;
        }
        covered.extend(node.iter().map(|n| n.id.as_str()));
        roots.push(node);
    }
    Ok(roots)
}

fn build_draft(
    position: usize,
    roots: &[&Node],
    index: &ScanIndex,
    snapshot: &DocumentSnapshot,
    metadata: &CallerMetadata,
) -> ContextDraft {
    let mut structure = StructureSummary::default();
    let mut text_entries = Vec::new();
    let mut styles = Vec::new();

    for root in roots {
        structure.depth = structure.depth.max(root.depth());

        let mut stack = vec![(*root, 0usize)];
        while let Some((node, level)) = stack.pop() {
            stack.extend(node.children.iter().rev().map(|c| (c, level + 1)));

            structure.node_count += 1;
            *structure.kinds.entry(node.kind).or_insert(0) += 1;
            structure.layer_names.push(node.name.clone());

            let component = index.component_for_member(&node.id);
            if let Some(component) = component {
                if !structure.components.contains(&component.id) {
                    structure.components.push(component.id.clone());
                }
            }
            structure.outline.push(outline_line(node, level, component.map(|c| c.id.as_str())));

            if node.kind == NodeKind::Text {
                match node.text.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => text_entries.push(text.to_string()),
                    _ => structure.empty_text_nodes += 1,
                }
            }

            for value in node.style.values() {
                styles.push(StyleUsage {
                    category: value.category(),
                    value: value.describe(),
                    token: index.token_for(value).map(|t| t.id.clone()),
                    count: 1,
                });
            }
        }
    }

    let node_ids: Vec<String> = roots.iter().map(|n| n.id.clone()).collect();
    let anchor = node_ids.first().map(String::as_str).unwrap_or_default();
    let render = |template: &Option<String>| {
        template
            .as_deref()
            .map(|t| render_template(t, anchor, metadata.file_key.as_deref()))
    };
    let frame_link = render(&metadata.frame_link_template);
    let visual_reference = render(&metadata.visual_reference_template);

    ContextDraft {
        selection_index: position,
        snapshot_id: snapshot.id().clone(),
        node_ids,
        text: text_entries.join("\n"),
        text_entries,
        structure,
        styles,
        visual_reference,
        tech_stack: metadata.tech_stack.clone(),
        frame_link,
        compliance: None,
        truncation: None,
    }
}

fn outline_line(node: &Node, level: usize, component: Option<&str>) -> String {
    let mut line = format!("{}{} \"{}\"", "  ".repeat(level), node.kind, node.name);
    if let Some(component) = component {
        line.push_str(&format!(" <{}>", component));
    }
    if let Some(text) = node.text.as_deref().filter(|t| !t.trim().is_empty()) {
        line.push_str(&format!(": {:?}", text.trim()));
    }
    line
}

/// Substitute `{node_id}` and `{file_key}`. A missing file key leaves its
/// placeholder in place, which the quality scorer reports.
pub fn render_template(template: &str, node_id: &str, file_key: Option<&str>) -> String {
    let rendered = template.replace("{node_id}", node_id);
    match file_key {
        Some(key) => rendered.replace("{file_key}", key),
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TRUNCATION_MARKER;
    use frameticket_common::AssemblyLimits;
    use frameticket_core::{normalize_snapshot, Color, RawDocument, StyleCategory};
    use frameticket_scanner::DesignSystemScanner;
    use serde_json::{json, Value};

    const RED: &str = "#E53935";
    const BLUE: &str = "#1E88E5";

    fn button(id: &str, fill: &str, label: &str) -> Vec<Value> {
        vec![
            json!({
                "id": id, "type": "FRAME", "name": "Button",
                "x": 0, "y": 0, "width": 120, "height": 40,
                "style": { "fill": fill, "cornerRadius": 8, "paddingLeft": 16 },
                "children": [format!("{id}-label")]
            }),
            json!({
                "id": format!("{id}-label"), "type": "TEXT", "name": "Label",
                "x": 16, "y": 10, "width": 80, "height": 20,
                "characters": label,
                "style": {
                    "fill": "#FFFFFF",
                    "font": { "family": "Inter", "size": 14, "weight": 500 }
                }
            }),
        ]
    }

    fn fixture() -> (ScanIndex, DocumentSnapshot) {
        let buttons = [
            ("btn1", RED, "Pay now"),
            ("btn2", RED, "Cancel"),
            ("btn3", RED, "Back"),
            ("btn4", RED, "Save"),
            ("btn5", BLUE, "Delete"),
        ];
        let ids: Vec<&str> = buttons.iter().map(|(id, _, _)| *id).collect();
        let mut nodes = vec![json!({
            "id": "page", "type": "FRAME", "name": "Checkout",
            "x": 0, "y": 0, "width": 1440, "height": 900,
            "style": { "fill": "#FFFFFF" },
            "children": ids
        })];
        for (id, fill, label) in buttons {
            nodes.extend(button(id, fill, label));
        }
        let raw: RawDocument =
            serde_json::from_value(json!({ "root": "page", "nodes": nodes })).unwrap();
        let snapshot = normalize_snapshot(&raw).unwrap();
        let index = DesignSystemScanner::new().scan(&snapshot);
        (index, snapshot)
    }

    fn metadata() -> CallerMetadata {
        CallerMetadata {
            tech_stack: Some("React + TypeScript".into()),
            frame_link_template: Some("https://design.test/file/{file_key}?node-id={node_id}".into()),
            file_key: Some("abc".into()),
            visual_reference_template: Some("https://design.test/render/{node_id}.png".into()),
        }
    }

    #[test]
    fn test_package_contents() {
        let (index, snapshot) = fixture();
        let package = ContextAssembler::new()
            .assemble_one(0, &Selection::new(["btn1"]), &index, &snapshot, &metadata())
            .unwrap();
        let draft = &package.content;

        assert_eq!(draft.node_ids, vec!["btn1"]);
        assert_eq!(draft.text, "Pay now");
        assert_eq!(draft.structure.node_count, 2);
        assert_eq!(draft.structure.depth, 2);
        assert_eq!(draft.structure.components, vec!["component-1"]);
        assert_eq!(draft.structure.outline[0], "frame \"Button\" <component-1>");
        assert_eq!(draft.structure.outline[1], "  text \"Label\": \"Pay now\"");
        assert_eq!(
            draft.frame_link.as_deref(),
            Some("https://design.test/file/abc?node-id=btn1")
        );
        assert_eq!(
            draft.visual_reference.as_deref(),
            Some("https://design.test/render/btn1.png")
        );

        let red = Color::from_hex(RED).unwrap().to_hex();
        let fill = draft
            .styles
            .iter()
            .find(|s| s.category == StyleCategory::Color && s.value == red)
            .expect("red fill listed");
        assert!(fill.token.is_some());

        let compliance = draft.compliance.as_ref().unwrap();
        assert_eq!(compliance.nodes_analyzed, 2);
        assert!(compliance.violations.is_empty());
        assert_eq!(package.quality.traceability, 100.0);
        assert!(package.quality.warning.is_none());
    }

    #[test]
    fn test_off_palette_usage_has_no_token() {
        let (index, snapshot) = fixture();
        let package = ContextAssembler::new()
            .assemble_one(0, &Selection::new(["btn5"]), &index, &snapshot, &metadata())
            .unwrap();
        let blue = Color::from_hex(BLUE).unwrap().to_hex();
        let fill = package
            .content
            .styles
            .iter()
            .find(|s| s.value == blue)
            .unwrap();
        assert_eq!(fill.token, None);
        assert!(!package.content.compliance.as_ref().unwrap().violations.is_empty());
    }

    #[test]
    fn test_batch_isolation() {
        let (index, snapshot) = fixture();
        let selections = vec![
            Selection::new(["btn1"]),
            Selection::default(),
            Selection::new(["nope"]),
            Selection::new(["btn2"]),
        ];
        let outcomes = ContextAssembler::new().assemble(
            &selections,
            &index,
            &snapshot,
            &metadata(),
            &CancellationFlag::new(),
        );

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_ready());
        let empty = outcomes[1].error().unwrap();
        assert_eq!((empty.index, empty.kind), (1, ErrorKind::EmptySelection));
        let missing = outcomes[2].error().unwrap();
        assert_eq!((missing.index, missing.kind), (2, ErrorKind::NodeNotFound));
        assert_eq!(outcomes[3].package().unwrap().content.text, "Cancel");
    }

    #[test]
    fn test_nested_selection_is_not_repeated() {
        let (index, snapshot) = fixture();
        let package = ContextAssembler::new()
            .assemble_one(0, &Selection::new(["btn1", "btn1-label"]), &index, &snapshot, &metadata())
            .unwrap();
        assert_eq!(package.content.node_ids, vec!["btn1"]);
        assert_eq!(package.content.structure.node_count, 2);
    }

    #[test]
    fn test_truncation_marker_and_suggestion() {
        let (index, snapshot) = fixture();
        let config = EngineConfig {
            limits: AssemblyLimits {
                max_text_chars: 4,
                max_nodes: 3,
                ..AssemblyLimits::default()
            },
            ..EngineConfig::default()
        };
        let package = ContextAssembler::with_config(config)
            .assemble_one(0, &Selection::new(["page"]), &index, &snapshot, &metadata())
            .unwrap();

        assert!(package.content.text.ends_with(TRUNCATION_MARKER));
        assert!(package.content.text.starts_with("Pay"));
        let truncation = package.content.truncation.unwrap();
        assert_eq!(truncation.omitted_nodes, 11 - 3);
        assert!(truncation.omitted_chars > 0);
        assert!(package
            .quality
            .suggestions
            .iter()
            .any(|s| s.contains("truncated")));
    }

    #[test]
    fn test_style_and_violation_budgets() {
        let (index, snapshot) = fixture();
        let page = Selection::new(["page"]);
        let full = ContextAssembler::new()
            .assemble_one(0, &page, &index, &snapshot, &metadata())
            .unwrap();
        let violations = full.content.compliance.as_ref().unwrap().violations.len();
        assert!(violations > 0);
        assert_eq!(full.content.styles.len(), 6);
        assert_eq!(full.content.truncation, None);

        let config = EngineConfig {
            limits: AssemblyLimits {
                max_style_lines: 2,
                max_violations: 0,
                ..AssemblyLimits::default()
            },
            ..EngineConfig::default()
        };
        let package = ContextAssembler::with_config(config)
            .assemble_one(0, &page, &index, &snapshot, &metadata())
            .unwrap();
        let draft = &package.content;

        let truncation = draft.truncation.unwrap();
        assert_eq!(truncation.omitted_styles, 4);
        assert_eq!(truncation.omitted_violations, violations);
        assert_eq!((truncation.omitted_chars, truncation.omitted_nodes), (0, 0));
        assert_eq!(draft.styles.len(), 2);
        assert_eq!(draft.styles[0].value, Color::from_hex("#FFFFFF").unwrap().to_hex());
        assert_eq!(draft.styles[0].count, 6);

        let compliance = draft.compliance.as_ref().unwrap();
        assert!(compliance.violations.is_empty());
        assert_eq!(
            compliance.overall_score,
            full.content.compliance.as_ref().unwrap().overall_score
        );
        assert_eq!(package.quality.structural_clarity, full.quality.structural_clarity);

        let prompt = crate::ticket::render_prompt(&package);
        assert!(prompt.contains("- … 4 less used styles [truncated]"));
        assert!(prompt.contains(&format!("- … {} less severe violations [truncated]", violations)));
    }

    #[test]
    fn test_cancelled_batch() {
        let (index, snapshot) = fixture();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let selections = vec![Selection::new(["btn1"]), Selection::new(["btn2"])];
        let outcomes =
            ContextAssembler::new().assemble(&selections, &index, &snapshot, &metadata(), &cancel);
        assert_eq!(
            outcomes,
            vec![
                PackageOutcome::Cancelled { index: 0 },
                PackageOutcome::Cancelled { index: 1 }
            ]
        );
    }

    #[test]
    fn test_cancel_mid_batch_keeps_committed_outcomes() {
        let (index, snapshot) = fixture();
        let cancel = CancellationFlag::new();
        let selections = vec![
            Selection::new(["btn1"]),
            Selection::new(["btn2"]),
            Selection::new(["btn3"]),
        ];
        let mut seen = 0;
        let outcomes = ContextAssembler::new().assemble_with_progress(
            &selections,
            &index,
            &snapshot,
            &metadata(),
            &cancel,
            |_| {
                seen += 1;
                cancel.cancel();
            },
        );

        assert_eq!(seen, 3);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].package().unwrap().content.text, "Pay now");
        assert_eq!(outcomes[1], PackageOutcome::Cancelled { index: 1 });
        assert_eq!(outcomes[2], PackageOutcome::Cancelled { index: 2 });
    }

    #[test]
    fn test_missing_file_key_leaves_placeholder() {
        assert_eq!(
            render_template("https://d.test/{file_key}?node-id={node_id}", "1:2", None),
            "https://d.test/{file_key}?node-id=1:2"
        );
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let (index, snapshot) = fixture();
        let selections: Vec<Selection> = vec![
            Selection::new(["btn1"]),
            Selection::new(["btn2"]),
            Selection::default(),
            Selection::new(["btn3", "btn4"]),
            Selection::new(["btn5"]),
        ];
        let config = EngineConfig {
            limits: AssemblyLimits {
                max_parallel: 2,
                ..AssemblyLimits::default()
            },
            ..EngineConfig::default()
        };

        let sequential = assemble(
            &selections,
            &index,
            &snapshot,
            &metadata(),
            &config,
            &CancellationFlag::new(),
        );
        let concurrent = assemble_concurrent(
            selections,
            Arc::new(index),
            Arc::new(snapshot),
            metadata(),
            config,
            CancellationFlag::new(),
        )
        .await;

        assert_eq!(concurrent.len(), 5);
        assert_eq!(concurrent, sequential);
        assert_eq!(concurrent[2].error().unwrap().index, 2);
    }
}
