use crate::types::{ContextDraft, StyleUsage};
use frameticket_core::StyleCategory;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Deduplication engine to remove redundant context
pub struct DeduplicationEngine;

impl DeduplicationEngine {
    /// Deduplicate text entries and style usage lines, keeping first-seen order.
    pub fn deduplicate(draft: &mut ContextDraft) {
        let initial_count = draft.text_entries.len() + draft.styles.len();

        // 1. Text entries, trimmed; blanks carry nothing
        let mut seen_text = HashSet::new();
        draft.text_entries.retain(|entry| {
            let key = entry.trim();
            !key.is_empty() && seen_text.insert(key.to_string())
        });
        draft.text = draft.text_entries.join("\n");

        // 2. Style usages by (category, value); counts are merged
        let mut merged: Vec<StyleUsage> = Vec::with_capacity(draft.styles.len());
        let mut positions: HashMap<(StyleCategory, String), usize> = HashMap::new();
        for usage in draft.styles.drain(..) {
            let key = (usage.category, usage.value.clone());
            match positions.get(&key) {
                Some(&i) => {
                    merged[i].count += usage.count;
                    if merged[i].token.is_none() {
                        merged[i].token = usage.token;
                    }
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(usage);
                }
            }
        }
        draft.styles = merged;

        let final_count = draft.text_entries.len() + draft.styles.len();
        if initial_count > final_count {
            debug!(
                "Deduplicated {} items from selection {}",
                initial_count - final_count,
                draft.selection_index
            );
        }
    }
}
