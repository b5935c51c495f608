//! Layer 2: semantic extraction via line-start keyword patterns.
//!
//! Scans assistant prose (code blocks stripped) for marker lines such as
//! `Decision: …`. Patterns anchor at line start after optional whitespace
//! and bold markers; a mid-line keyword inside a list item intentionally
//! does not match.

use std::sync::LazyLock;

use cortex_core::event::{Event, EventType};
use regex::Regex;

use crate::entry::{strip_code_blocks, Role, TranscriptEntry};
use crate::extract::ExtractionContext;

struct Pattern {
    regex: Regex,
    event_type: EventType,
    confidence: f64,
}

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    // Bold markers may wrap the marker itself (`**Decision:** …`), so the
    // closing `**` after the colon is consumed before capturing.
    let pattern = |marker: &str, event_type, confidence| Pattern {
        regex: Regex::new(&format!(r"(?m)^[ \t]*(?:\*\*)?{marker}:(?:\*\*)?\s*(.+)$"))
            .expect("semantic pattern regex"),
        event_type,
        confidence,
    };
    vec![
        pattern("Decision", EventType::DecisionMade, 0.85),
        pattern("Rejected", EventType::ApproachRejected, 0.85),
        pattern("Fixed", EventType::ErrorResolved, 0.75),
        pattern("Error resolved", EventType::ErrorResolved, 0.70),
        pattern("(?:Learned|Lesson|TIL)", EventType::KnowledgeAcquired, 0.70),
        pattern("Preference", EventType::PreferenceNoted, 0.80),
    ]
});

pub fn extract(entry: &TranscriptEntry, ctx: &ExtractionContext) -> Vec<Event> {
    if entry.role != Role::Assistant {
        return Vec::new();
    }
    let text = strip_code_blocks(&entry.text_content());
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut events = Vec::new();
    for pattern in PATTERNS.iter() {
        for captures in pattern.regex.captures_iter(&text) {
            let Some(matched) = captures.get(1) else { continue };
            let content = matched.as_str().trim_end_matches("**").trim();
            if content.is_empty() {
                continue;
            }
            let built = Event::builder(pattern.event_type, content)
                .session_id(&ctx.session_id)
                .project(&ctx.project)
                .git_branch(ctx.branch_for(entry))
                .confidence(pattern.confidence)
                .provenance("semantic")
                .build();
            if let Ok(event) = built {
                events.push(event);
            }
        }
    }
    events
}
