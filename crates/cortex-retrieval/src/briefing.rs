//! Session briefing composition.
//!
//! Renders the three briefing buckets into markdown under a character
//! budget of `max_briefing_tokens × 4`. On tier 1+ the rendered markdown
//! is cached as a per-branch snapshot and served verbatim until events
//! change or the TTL lapses.

use std::path::Path;

use cortex_core::config::CortexConfig;
use cortex_core::constants::CHARS_PER_TOKEN;
use cortex_core::errors::CortexResult;
use cortex_core::event::Event;
use cortex_core::fsio::write_atomic;
use cortex_storage::{snapshot, BriefingEvents, EventStorage};
use tracing::debug;

/// Generate the briefing markdown for a project store.
///
/// `use_cache=false` forces regeneration even when a valid snapshot
/// exists (the snapshot is still refreshed afterwards).
pub fn generate_briefing(
    store: &dyn EventStorage,
    config: &CortexConfig,
    branch: Option<&str>,
    use_cache: bool,
) -> CortexResult<String> {
    let branch_key = branch.unwrap_or("");

    if use_cache && config.storage_tier >= 1 {
        if let Some(sqlite) = store.as_sqlite() {
            if let Some(snap) = snapshot::get_valid_snapshot(sqlite.conn(), branch_key)? {
                debug!(branch = branch_key, "briefing served from snapshot");
                return Ok(snap.briefing_markdown);
            }
        }
    }

    let buckets = store.load_for_briefing(branch)?;
    let markdown = render_briefing(
        &buckets,
        config.max_briefing_tokens * CHARS_PER_TOKEN,
        config.max_full_decisions,
        config.max_summary_decisions,
    );

    if config.storage_tier >= 1 {
        if let Some(sqlite) = store.as_sqlite() {
            let event_ids: Vec<String> = buckets
                .immortal
                .iter()
                .chain(&buckets.active_plan)
                .chain(&buckets.recent)
                .map(|e| e.id.clone())
                .collect();
            let last_event_id = event_ids.first().cloned().unwrap_or_default();
            snapshot::save_snapshot(
                sqlite.conn(),
                branch_key,
                &markdown,
                &event_ids,
                &last_event_id,
                config.snapshot_ttl_hours,
            )?;
        }
    }

    Ok(markdown)
}

/// Render briefing buckets into markdown, enforcing the character budget
/// after every line: the first line that would overflow ends the briefing.
/// Sections without content emit no header.
pub fn render_briefing(
    buckets: &BriefingEvents,
    max_chars: usize,
    max_full: usize,
    max_summary: usize,
) -> String {
    let mut out = String::new();
    let mut push = |out: &mut String, piece: &str| -> bool {
        if out.len() + piece.len() > max_chars {
            return false;
        }
        out.push_str(piece);
        true
    };

    let full_immortal: &[Event] = &buckets.immortal[..buckets.immortal.len().min(max_full)];
    let summary_immortal: &[Event] = if buckets.immortal.len() > max_full {
        &buckets.immortal[max_full..buckets.immortal.len().min(max_full + max_summary)]
    } else {
        &[]
    };

    if !full_immortal.is_empty() || !summary_immortal.is_empty() {
        if !push(&mut out, "# Decisions & Rejections\n\n") {
            return out;
        }
        for event in full_immortal {
            if !push(&mut out, &format_event_line(event, true)) {
                return out;
            }
        }
        for event in summary_immortal {
            if !push(&mut out, &format_event_line(event, false)) {
                return out;
            }
        }
        if !push(&mut out, "\n") {
            return out;
        }
    }

    if !buckets.active_plan.is_empty() {
        if !push(&mut out, "## Active Plan\n\n") {
            return out;
        }
        for event in &buckets.active_plan {
            if !push(&mut out, &format_event_line(event, true)) {
                return out;
            }
        }
        if !push(&mut out, "\n") {
            return out;
        }
    }

    if !buckets.recent.is_empty() {
        if !push(&mut out, "## Recent Context\n\n") {
            return out;
        }
        for event in &buckets.recent {
            if !push(&mut out, &format_event_line(event, true)) {
                return out;
            }
        }
    }

    out
}

/// One bulleted item. Summary mode takes the first line, truncated to 80
/// chars with an ellipsis.
fn format_event_line(event: &Event, full: bool) -> String {
    let raw = event.content.trim();
    if raw.is_empty() {
        return "- (no content)\n".to_string();
    }
    if full {
        return format!("- {raw}\n");
    }
    let first_line = raw.lines().next().unwrap_or("");
    let mut summary: String = first_line.chars().take(80).collect();
    if first_line.chars().count() > 80 {
        summary.push_str("...");
    }
    format!("- {summary}\n")
}

/// Generate the briefing and write it atomically, creating parent
/// directories. The session-start path for
/// `<project>/.claude/rules/cortex-briefing.md`.
pub fn write_briefing_to_file(
    output_path: &Path,
    store: &dyn EventStorage,
    config: &CortexConfig,
    branch: Option<&str>,
    use_cache: bool,
) -> CortexResult<()> {
    let markdown = generate_briefing(store, config, branch, use_cache)?;
    write_atomic(output_path, &markdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::event::EventType;

    fn events(ty: EventType, n: usize, content_len: usize) -> Vec<Event> {
        (0..n)
            .map(|i| {
                let filler = "x".repeat(content_len.saturating_sub(12));
                Event::builder(ty, format!("item {i:03} {filler}"))
                    .session_id("s")
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn sections_render_in_order_with_headers() {
        let buckets = BriefingEvents {
            immortal: events(EventType::DecisionMade, 2, 20),
            active_plan: events(EventType::PlanCreated, 1, 20),
            recent: events(EventType::CommandRun, 2, 20),
        };
        let md = render_briefing(&buckets, 10_000, 50, 30);

        let decisions = md.find("# Decisions & Rejections").unwrap();
        let plan = md.find("## Active Plan").unwrap();
        let recent = md.find("## Recent Context").unwrap();
        assert!(decisions < plan && plan < recent);
        assert_eq!(md.matches("- item").count(), 5);
    }

    #[test]
    fn empty_sections_emit_no_headers() {
        let buckets = BriefingEvents {
            immortal: Vec::new(),
            active_plan: Vec::new(),
            recent: events(EventType::CommandRun, 1, 20),
        };
        let md = render_briefing(&buckets, 10_000, 50, 30);
        assert!(!md.contains("# Decisions & Rejections"));
        assert!(!md.contains("## Active Plan"));
        assert!(md.contains("## Recent Context"));
    }

    #[test]
    fn immortal_overflow_becomes_one_line_summaries() {
        let mut immortal = events(EventType::DecisionMade, 3, 20);
        immortal.push(
            Event::builder(
                EventType::DecisionMade,
                format!("{}\nsecond line", "long first line ".repeat(10)),
            )
            .session_id("s")
            .build()
            .unwrap(),
        );
        let buckets = BriefingEvents {
            immortal,
            active_plan: Vec::new(),
            recent: Vec::new(),
        };
        // max_full 3 pushes the long event into summary mode.
        let md = render_briefing(&buckets, 10_000, 3, 30);
        assert!(md.contains("..."));
        assert!(!md.contains("second line"));
    }

    #[test]
    fn budget_is_a_hard_cap() {
        let buckets = BriefingEvents {
            immortal: events(EventType::DecisionMade, 60, 120),
            active_plan: events(EventType::PlanCreated, 5, 120),
            recent: events(EventType::KnowledgeAcquired, 60, 120),
        };
        let budget = 3000 * CHARS_PER_TOKEN;
        let md = render_briefing(&buckets, budget, 50, 30);
        assert!(md.len() <= budget);
        // Immortal events come first; the cut falls later.
        assert!(md.starts_with("# Decisions & Rejections"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let buckets = BriefingEvents {
            immortal: events(EventType::DecisionMade, 4, 40),
            active_plan: events(EventType::PlanCreated, 2, 40),
            recent: events(EventType::CommandRun, 4, 40),
        };
        let a = render_briefing(&buckets, 2000, 50, 30);
        let b = render_briefing(&buckets, 2000, 50, 30);
        assert_eq!(a, b);
    }
}
