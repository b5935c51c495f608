//! Hook-level scenarios: a full session through Stop, plan progression
//! across sessions, empty sessions, and the reset/re-extract cycle.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use cortex_core::config::{load_config, CortexConfig};
use cortex_core::project::project_hash;
use cortex_hooks::{run_session_start, run_stop, CwdPayload, StopPayload};
use cortex_storage::{open_event_store, HookState, HookStateFile};
use serde_json::json;

struct Fixture {
    _home: tempfile::TempDir,
    project: tempfile::TempDir,
    config: CortexConfig,
    hash: String,
}

impl Fixture {
    fn new() -> Self {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let config = load_config(Some(home.path()));
        let hash = project_hash(project.path());
        Self {
            _home: home,
            project,
            config,
            hash,
        }
    }

    fn cwd(&self) -> String {
        self.project.path().display().to_string()
    }

    fn write_transcript(&self, name: &str, lines: &[String]) -> PathBuf {
        let path = self.project.path().join(name);
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        f.flush().unwrap();
        path
    }

    fn stop(&self, transcript: &Path, session_id: &str) {
        let payload = StopPayload {
            cwd: self.cwd(),
            transcript_path: transcript.display().to_string(),
            session_id: session_id.to_string(),
            stop_hook_active: false,
        };
        run_stop(&payload, &self.config, false).unwrap();
    }

    fn briefing(&self) -> String {
        run_session_start(&CwdPayload { cwd: self.cwd() }, &self.config).unwrap();
        std::fs::read_to_string(
            self.project
                .path()
                .join(".claude/rules/cortex-briefing.md"),
        )
        .unwrap()
    }
}

fn assistant_text(session: &str, text: &str) -> String {
    json!({
        "type": "assistant", "sessionId": session,
        "message": {"role": "assistant", "content": [{"type": "text", "text": text}]}
    })
    .to_string()
}

fn todo_write(session: &str, todos: &[(&str, &str)]) -> String {
    let todos: Vec<_> = todos
        .iter()
        .map(|(content, status)| json!({"content": content, "status": status}))
        .collect();
    json!({
        "type": "assistant", "sessionId": session,
        "message": {"role": "assistant", "content": [
            {"type": "tool_use", "id": "t", "name": "TodoWrite", "input": {"todos": todos}}
        ]}
    })
    .to_string()
}

fn todo_transition(session: &str, old: &[(&str, &str)], new: &[(&str, &str)]) -> String {
    let to_json = |todos: &[(&str, &str)]| -> Vec<serde_json::Value> {
        todos
            .iter()
            .map(|(content, status)| json!({"content": content, "status": status}))
            .collect()
    };
    json!({
        "type": "user", "sessionId": session,
        "message": {"role": "user", "content": [
            {"type": "tool_result", "tool_use_id": "t", "content": "ok"}
        ]},
        "toolUseResult": {"oldTodos": to_json(old), "newTodos": to_json(new)}
    })
    .to_string()
}

#[test]
fn single_session_stop_stores_events_and_state() {
    let fx = Fixture::new();
    let transcript = fx.write_transcript(
        "s1.jsonl",
        &[
            json!({
                "type": "user", "sessionId": "s1",
                "message": {"role": "user", "content": "[MEMORY: Use Python 3.11+]"}
            })
            .to_string(),
            assistant_text("s1", "Decision: Use Python 3.11+\n\nRejected: Python 3.9"),
        ],
    );

    fx.stop(&transcript, "s1");

    let store = open_event_store(&fx.hash, &fx.config).unwrap();
    assert_eq!(store.count().unwrap(), 3);
    assert_eq!(store.load_immortal().unwrap().len(), 2);

    let state = HookStateFile::new(&fx.hash, &fx.config).unwrap().load();
    assert_eq!(state.last_session_id, "s1");
    assert_eq!(state.session_count, 1);
    assert_eq!(state.last_transcript_position, transcript.metadata().unwrap().len());
    assert!(!state.last_extraction_time.is_empty());

    // Re-running Stop on the unchanged transcript adds nothing.
    fx.stop(&transcript, "s1");
    let store = open_event_store(&fx.hash, &fx.config).unwrap();
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn plan_progression_across_three_sessions() {
    let fx = Fixture::new();

    // Session a: the plan is created with three pending todos.
    let t_a = fx.write_transcript(
        "a.jsonl",
        &[todo_write(
            "s2a",
            &[
                ("design schema", "in_progress"),
                ("write queries", "pending"),
                ("add tests", "pending"),
            ],
        )],
    );
    fx.stop(&t_a, "s2a");

    // Session b: todo #1 completes.
    let t_b = fx.write_transcript(
        "b.jsonl",
        &[todo_transition(
            "s2b",
            &[
                ("design schema", "in_progress"),
                ("write queries", "pending"),
                ("add tests", "pending"),
            ],
            &[
                ("design schema", "completed"),
                ("write queries", "pending"),
                ("add tests", "pending"),
            ],
        )],
    );
    fx.stop(&t_b, "s2b");

    // Session c: todos #2 and #3 complete.
    let t_c = fx.write_transcript(
        "c.jsonl",
        &[todo_transition(
            "s2c",
            &[
                ("design schema", "completed"),
                ("write queries", "pending"),
                ("add tests", "in_progress"),
            ],
            &[
                ("design schema", "completed"),
                ("write queries", "completed"),
                ("add tests", "completed"),
            ],
        )],
    );
    fx.stop(&t_c, "s2c");

    let briefing = fx.briefing();
    let plan_section = briefing
        .split("## Active Plan")
        .nth(1)
        .expect("briefing has an active plan section");

    // The plan listing itself renders with checkbox markers; the three
    // completed-step bullets are bare and must appear in completion order.
    let positions: Vec<usize> = ["\n- design schema", "\n- write queries", "\n- add tests"]
        .iter()
        .map(|step| plan_section.find(step).expect("step bullet listed"))
        .collect();
    assert!(positions[0] < positions[1] && positions[1] < positions[2]);
    assert!(plan_section.contains("- [~] design schema"));
}

#[test]
fn empty_session_is_a_clean_noop() {
    let fx = Fixture::new();
    let transcript = fx.write_transcript(
        "empty.jsonl",
        &[
            json!({"type": "summary", "summary": "old session"}).to_string(),
            json!({"type": "file-history-snapshot"}).to_string(),
        ],
    );

    fx.stop(&transcript, "s3");

    let store = open_event_store(&fx.hash, &fx.config).unwrap();
    assert_eq!(store.count().unwrap(), 0);

    // Offset advanced past the metadata lines regardless.
    let state = HookStateFile::new(&fx.hash, &fx.config).unwrap().load();
    assert_eq!(state.last_transcript_position, transcript.metadata().unwrap().len());

    let briefing = fx.briefing();
    assert!(briefing.is_empty());
}

#[test]
fn missing_transcript_and_blank_payload_are_noops() {
    let fx = Fixture::new();
    let payload = StopPayload {
        cwd: fx.cwd(),
        transcript_path: fx.project.path().join("absent.jsonl").display().to_string(),
        session_id: "s".to_string(),
        stop_hook_active: false,
    };
    run_stop(&payload, &fx.config, false).unwrap();
    run_stop(&StopPayload::default(), &fx.config, false).unwrap();

    // Recursion guard short-circuits before any I/O.
    let guard = StopPayload {
        stop_hook_active: true,
        ..payload
    };
    run_stop(&guard, &fx.config, false).unwrap();
}

#[test]
fn reset_cycle_reparses_from_offset_zero() {
    let fx = Fixture::new();
    let transcript = fx.write_transcript(
        "s5.jsonl",
        &[assistant_text("s5", "Decision: keep the reset lever")],
    );
    fx.stop(&transcript, "s5");

    let store = open_event_store(&fx.hash, &fx.config).unwrap();
    assert_eq!(store.count().unwrap(), 1);

    // Reset: clear store and state, as the CLI does.
    store.clear().unwrap();
    let state_file = HookStateFile::new(&fx.hash, &fx.config).unwrap();
    state_file.save(&HookState::default()).unwrap();

    // The next Stop starts from offset 0 and re-extracts everything.
    fx.stop(&transcript, "s5");
    let store = open_event_store(&fx.hash, &fx.config).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(
        HookStateFile::new(&fx.hash, &fx.config).unwrap().load().last_transcript_position,
        transcript.metadata().unwrap().len()
    );
}

#[test]
fn transcript_switch_resets_offset() {
    let fx = Fixture::new();
    let first = fx.write_transcript("one.jsonl", &[assistant_text("s1", "Decision: one")]);
    fx.stop(&first, "s1");

    // A different transcript path must be read from zero even though the
    // stored offset is past its length.
    let second = fx.write_transcript("two.jsonl", &[assistant_text("s2", "Decision: two")]);
    fx.stop(&second, "s2");

    let store = open_event_store(&fx.hash, &fx.config).unwrap();
    assert_eq!(store.count().unwrap(), 2);
}
