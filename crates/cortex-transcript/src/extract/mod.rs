//! Three-layer event extraction pipeline.
//!
//! - Layer 1 (structural): tool-call observation — Write → file_modified,
//!   Bash → command_run, TodoWrite → plan_created, todo transitions →
//!   plan_step_completed.
//! - Layer 2 (semantic): line-start keyword patterns on assistant prose.
//! - Layer 3 (explicit): `[MEMORY: …]` tags in either role's text.
//!
//! The orchestrator runs all three per entry in order, then deduplicates
//! the combined batch by content hash, keeping first occurrences. A
//! malformed entry skips, never aborts: extraction must not take a hook
//! down.

pub mod explicit;
pub mod semantic;
pub mod structural;

use std::collections::HashSet;

use cortex_core::event::{content_hash, Event};

use crate::entry::TranscriptEntry;

/// Defaults carried by the pipeline; individual entries may override the
/// branch when the transcript records one.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub session_id: String,
    pub project: String,
    pub git_branch: String,
}

impl ExtractionContext {
    /// Branch for an entry: the entry's own record-level branch wins when
    /// present.
    pub(crate) fn branch_for(&self, entry: &TranscriptEntry) -> String {
        if entry.git_branch.is_empty() {
            self.git_branch.clone()
        } else {
            entry.git_branch.clone()
        }
    }
}

/// Run all three layers over a batch of entries and deduplicate the result
/// by content hash, preserving transcript order.
pub fn extract_events(entries: &[TranscriptEntry], ctx: &ExtractionContext) -> Vec<Event> {
    let mut events = Vec::new();
    for entry in entries {
        events.extend(structural::extract(entry, ctx));
        events.extend(semantic::extract(entry, ctx));
        events.extend(explicit::extract(entry, ctx));
    }

    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(content_hash(e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::parse_record;
    use cortex_core::event::EventType;
    use serde_json::json;

    fn assistant(content: serde_json::Value) -> TranscriptEntry {
        parse_record(
            &json!({
                "type": "assistant",
                "sessionId": "s1",
                "gitBranch": "main",
                "message": {"role": "assistant", "content": content}
            })
            .to_string(),
        )
        .unwrap()
    }

    fn ctx() -> ExtractionContext {
        ExtractionContext {
            session_id: "s1".to_string(),
            project: "/p".to_string(),
            git_branch: "main".to_string(),
        }
    }

    #[test]
    fn batch_dedup_keeps_first_occurrence() {
        let entry = assistant(json!([
            {"type": "text", "text": "Decision: Use Rust"},
            {"type": "text", "text": "Decision: Use Rust"}
        ]));
        // Both text blocks concatenate; the semantic layer fires twice on
        // identical lines but dedup collapses them.
        let events = extract_events(&[entry.clone(), entry], &ctx());
        let decisions: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::DecisionMade)
            .collect();
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn entry_branch_overrides_context_branch() {
        let entry = parse_record(
            &json!({
                "type": "assistant",
                "gitBranch": "feature/x",
                "message": {"role": "assistant", "content": [
                    {"type": "text", "text": "Decision: branch scoped"}
                ]}
            })
            .to_string(),
        )
        .unwrap();
        let events = extract_events(&[entry], &ctx());
        assert_eq!(events[0].git_branch, "feature/x");
    }

    #[test]
    fn layers_run_in_order_per_entry() {
        let entry = assistant(json!([
            {"type": "tool_use", "id": "t", "name": "Bash", "input": {"command": "cargo test"}},
            {"type": "text", "text": "Decision: keep it\n\n[MEMORY: remember this]"}
        ]));
        let events = extract_events(&[entry], &ctx());
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::CommandRun,
                EventType::DecisionMade,
                EventType::KnowledgeAcquired
            ]
        );
    }
}
