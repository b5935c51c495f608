//! Layer 3: explicit `[MEMORY: …]` tags.
//!
//! Either role can pin a fact directly. Tags carry confidence 1.0 and
//! provenance `explicit`; metadata records which side wrote the tag.

use std::sync::LazyLock;

use cortex_core::event::{Event, EventType};
use regex::Regex;
use serde_json::json;

use crate::entry::{Role, TranscriptEntry};
use crate::extract::ExtractionContext;

static MEMORY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[MEMORY:\s*(.+?)\]").expect("memory tag regex"));

pub fn extract(entry: &TranscriptEntry, ctx: &ExtractionContext) -> Vec<Event> {
    let text = entry.text_content();
    if text.is_empty() {
        return Vec::new();
    }
    let source = match entry.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let mut events = Vec::new();
    for captures in MEMORY_TAG.captures_iter(&text) {
        let Some(matched) = captures.get(1) else { continue };
        let content = matched.as_str().trim();
        if content.is_empty() {
            continue;
        }
        let built = Event::builder(EventType::KnowledgeAcquired, content)
            .session_id(&ctx.session_id)
            .project(&ctx.project)
            .git_branch(ctx.branch_for(entry))
            .confidence(1.0)
            .provenance("explicit")
            .metadata("source", json!(source))
            .build();
        if let Ok(event) = built {
            events.push(event);
        }
    }
    events
}
