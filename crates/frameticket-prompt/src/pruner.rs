use crate::types::{ContextDraft, Truncation, TRUNCATION_MARKER};
use frameticket_common::AssemblyLimits;
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{debug, info};

/// Keeps a context draft within its payload budget
pub struct PayloadPruner {
    max_nodes: usize,
    max_text_chars: usize,
    max_style_lines: usize,
    max_violations: usize,
}

impl PayloadPruner {
    pub fn new(limits: &AssemblyLimits) -> Self {
        Self {
            max_nodes: limits.max_nodes,
            max_text_chars: limits.max_text_chars,
            max_style_lines: limits.max_style_lines,
            max_violations: limits.max_violations,
        }
    }

    /// Cut the draft down to budget. Content is shortened, never dropped silently:
    /// every cut leaves the marker and the returned record says how much went.
    pub fn prune(&self, draft: &mut ContextDraft) -> Option<Truncation> {
        let truncation = Truncation {
            omitted_chars: self.truncate_text(draft),
            omitted_nodes: self.truncate_structure(draft),
            omitted_styles: self.truncate_styles(draft),
            omitted_violations: self.truncate_violations(draft),
        };

        if truncation.is_empty() {
            debug!(
                "Selection {} within budget ({} nodes, {} chars)",
                draft.selection_index,
                draft.structure.outline.len(),
                draft.text.chars().count()
            );
            return None;
        }

        info!(
            "✂️ Pruned selection {}: {} chars, {} nodes, {} style lines, {} violations omitted",
            draft.selection_index,
            truncation.omitted_chars,
            truncation.omitted_nodes,
            truncation.omitted_styles,
            truncation.omitted_violations
        );
        draft.truncation = Some(truncation);
        Some(truncation)
    }

    fn truncate_text(&self, draft: &mut ContextDraft) -> usize {
        let total = draft.text.chars().count();
        if total <= self.max_text_chars {
            return 0;
        }

        let cut = draft
            .text
            .char_indices()
            .nth(self.max_text_chars)
            .map(|(i, _)| i)
            .unwrap_or(draft.text.len());
        draft.text.truncate(cut);
        let kept = draft.text.trim_end().len();
        draft.text.truncate(kept);
        if !draft.text.is_empty() {
            draft.text.push(' ');
        }
        draft.text.push_str(TRUNCATION_MARKER);

        // Only entries that survived whole stay listed.
        let mut budget = self.max_text_chars;
        let mut keep = 0;
        for entry in &draft.text_entries {
            let len = entry.chars().count();
            if len > budget {
                break;
            }
            budget = budget.saturating_sub(len + 1);
            keep += 1;
        }
        draft.text_entries.truncate(keep);

        total - self.max_text_chars
    }

    fn truncate_structure(&self, draft: &mut ContextDraft) -> usize {
        let structure = &mut draft.structure;
        let total = structure.outline.len();
        if total <= self.max_nodes {
            return 0;
        }

        let omitted = total - self.max_nodes;
        structure.outline.truncate(self.max_nodes);
        structure
            .outline
            .push(format!("… {} more nodes {}", omitted, TRUNCATION_MARKER));
        structure.layer_names.truncate(self.max_nodes);
        omitted
    }

    fn truncate_styles(&self, draft: &mut ContextDraft) -> usize {
        keep_top(&mut draft.styles, self.max_style_lines, |usage| usage.count)
    }

    fn truncate_violations(&self, draft: &mut ContextDraft) -> usize {
        match draft.compliance.as_mut() {
            Some(report) => keep_top(&mut report.violations, self.max_violations, |v| v.severity),
            None => 0,
        }
    }
}

/// Keep the `limit` highest-ranked items in their original order; ties go to
/// the earlier item. Returns how many were dropped.
fn keep_top<T, K, F>(items: &mut Vec<T>, limit: usize, rank: F) -> usize
where
    K: Ord,
    F: Fn(&T) -> K,
{
    if items.len() <= limit {
        return 0;
    }
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by_key(|&i| Reverse(rank(&items[i])));
    let keep: HashSet<usize> = order.into_iter().take(limit).collect();

    let omitted = items.len() - limit;
    let mut position = 0;
    items.retain(|_| {
        let kept = keep.contains(&position);
        position += 1;
        kept
    });
    omitted
}
