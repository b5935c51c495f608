//! Tier-3 projections: human-readable markdown views of the store,
//! regenerated from the Stop hook. Same section rules as the briefing,
//! no token budget, written under `<project>/.cortex/`.

use std::path::Path;

use cortex_core::config::CortexConfig;
use cortex_core::errors::CortexResult;
use cortex_core::event::Event;
use cortex_core::fsio::write_atomic;
use cortex_storage::EventStorage;

/// Regenerate `decisions.md`, `decisions-archive.md`, and
/// `active-plan.md` for a project working directory.
pub fn regenerate_all(
    store: &dyn EventStorage,
    cwd: &Path,
    branch: Option<&str>,
    config: &CortexConfig,
) -> CortexResult<()> {
    let buckets = store.load_for_briefing(branch)?;
    let out_dir = cwd.join(".cortex");

    let active_cap = config.max_full_decisions;
    let active: &[Event] = &buckets.immortal[..buckets.immortal.len().min(active_cap)];
    let archived: &[Event] = if buckets.immortal.len() > active_cap {
        &buckets.immortal[active_cap..]
    } else {
        &[]
    };

    write_atomic(
        &out_dir.join("decisions.md"),
        &render_section("# Decisions & Rejections", active),
    )?;
    write_atomic(
        &out_dir.join("decisions-archive.md"),
        &render_section("# Archived Decisions", archived),
    )?;
    write_atomic(
        &out_dir.join("active-plan.md"),
        &render_section("# Active Plan", &buckets.active_plan),
    )?;
    Ok(())
}

fn render_section(header: &str, events: &[Event]) -> String {
    let mut out = format!("{header}\n\n");
    if events.is_empty() {
        out.push_str("_None recorded._\n");
        return out;
    }
    for event in events {
        out.push_str(&format!("- {}\n", event.content.trim()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::event::EventType;
    use cortex_storage::{EventStorage, FileEventStore};

    #[test]
    fn writes_all_three_projections() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::at_dir(dir.path());
        store
            .append_many(vec![
                Event::builder(EventType::DecisionMade, "Use WAL mode")
                    .session_id("s")
                    .build()
                    .unwrap(),
                Event::builder(EventType::PlanCreated, "- [ ] write docs")
                    .session_id("s")
                    .build()
                    .unwrap(),
            ])
            .unwrap();

        let config = CortexConfig::default();
        regenerate_all(&store as &dyn EventStorage, dir.path(), None, &config).unwrap();

        let decisions =
            std::fs::read_to_string(dir.path().join(".cortex/decisions.md")).unwrap();
        assert!(decisions.contains("Use WAL mode"));
        let archive =
            std::fs::read_to_string(dir.path().join(".cortex/decisions-archive.md")).unwrap();
        assert!(archive.contains("_None recorded._"));
        let plan = std::fs::read_to_string(dir.path().join(".cortex/active-plan.md")).unwrap();
        assert!(plan.contains("write docs"));
    }

    #[test]
    fn overflow_decisions_land_in_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::at_dir(dir.path());
        let events: Vec<Event> = (0..60)
            .map(|i| {
                Event::builder(EventType::DecisionMade, format!("decision {i}"))
                    .session_id("s")
                    .build()
                    .unwrap()
            })
            .collect();
        store.append_many(events).unwrap();

        let config = CortexConfig::default(); // max_full_decisions = 50
        regenerate_all(&store as &dyn EventStorage, dir.path(), None, &config).unwrap();

        let decisions =
            std::fs::read_to_string(dir.path().join(".cortex/decisions.md")).unwrap();
        let archive =
            std::fs::read_to_string(dir.path().join(".cortex/decisions-archive.md")).unwrap();
        assert_eq!(decisions.matches("- decision").count(), 50);
        assert_eq!(archive.matches("- decision").count(), 10);
    }
}
