//! End-to-end pipeline tests: transcript file → reader → extraction.

use std::fs::File;
use std::io::Write;

use cortex_core::event::EventType;
use cortex_transcript::{extract_events, ExtractionContext, TranscriptReader};
use serde_json::json;

fn ctx() -> ExtractionContext {
    ExtractionContext {
        session_id: "sess-1".to_string(),
        project: "/p".to_string(),
        git_branch: "main".to_string(),
    }
}

fn write_lines(path: &std::path::Path, lines: &[String]) {
    let mut f = File::create(path).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    f.flush().unwrap();
}

fn single_session_lines() -> Vec<String> {
    vec![
        json!({
            "type": "user", "sessionId": "sess-1",
            "message": {"role": "user", "content": "Create a Python script that prints 'Hello'"}
        })
        .to_string(),
        json!({
            "type": "assistant", "sessionId": "sess-1",
            "message": {"role": "assistant", "content": [
                {"type": "tool_use", "id": "t1", "name": "Write",
                 "input": {"file_path": "/p/hello.py", "content": "print('Hello')"}}
            ]}
        })
        .to_string(),
        json!({
            "type": "user", "sessionId": "sess-1",
            "message": {"role": "user", "content": "[MEMORY: Use Python 3.11+]"}
        })
        .to_string(),
        json!({
            "type": "assistant", "sessionId": "sess-1",
            "message": {"role": "assistant", "content": [
                {"type": "text", "text": "Decision: Use Python 3.11+\n\nRejected: Python 3.9"}
            ]}
        })
        .to_string(),
        json!({
            "type": "assistant", "sessionId": "sess-1",
            "message": {"role": "assistant", "content": [
                {"type": "tool_use", "id": "t2", "name": "Bash", "input": {"command": "pytest -v"}}
            ]}
        })
        .to_string(),
    ]
}

#[test]
fn single_session_extracts_expected_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    write_lines(&path, &single_session_lines());

    let mut reader = TranscriptReader::new(&path);
    let entries = reader.read_new(0).unwrap();
    let events = extract_events(&entries, &ctx());

    let expect = [
        (EventType::FileModified, "Modified: /p/hello.py"),
        (EventType::KnowledgeAcquired, "Use Python 3.11+"),
        (EventType::DecisionMade, "Use Python 3.11+"),
        (EventType::ApproachRejected, "Python 3.9"),
        (EventType::CommandRun, "pytest -v"),
    ];
    assert_eq!(events.len(), expect.len());
    for (event, (ty, content)) in events.iter().zip(expect.iter()) {
        assert_eq!(event.event_type, *ty);
        assert_eq!(event.content, *content);
    }

    let memory = &events[1];
    assert_eq!(memory.provenance, "explicit");
    assert!((memory.confidence - 1.0).abs() < f64::EPSILON);
    let decision = &events[2];
    assert!((decision.confidence - 0.85).abs() < f64::EPSILON);

    assert_eq!(events.iter().filter(|e| e.immortal).count(), 2);
}

#[test]
fn resumed_read_yields_same_events_as_full_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    let lines = single_session_lines();

    // First pass: only the first two lines exist.
    write_lines(&path, &lines[..2]);
    let mut reader = TranscriptReader::new(&path);
    let first = reader.read_new(0).unwrap();
    let offset = reader.last_offset();

    // The host appends the rest; resume from the stored offset.
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    for line in &lines[2..] {
        writeln!(f, "{line}").unwrap();
    }
    f.flush().unwrap();
    let second = reader.read_new(offset).unwrap();

    let incremental: Vec<_> = extract_events(
        &[first, second].concat(),
        &ctx(),
    )
    .iter()
    .map(|e| (e.event_type, e.content.clone()))
    .collect();

    // Compare against a single full read of the complete file.
    let mut full_reader = TranscriptReader::new(&path);
    let full_entries = full_reader.read_new(0).unwrap();
    let full: Vec<_> = extract_events(&full_entries, &ctx())
        .iter()
        .map(|e| (e.event_type, e.content.clone()))
        .collect();

    assert_eq!(incremental, full);
}

#[test]
fn metadata_only_transcript_yields_no_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.jsonl");
    write_lines(
        &path,
        &[
            json!({"type": "summary", "summary": "an old session"}).to_string(),
            json!({"type": "file-history-snapshot", "messageId": "m1"}).to_string(),
        ],
    );

    let mut reader = TranscriptReader::new(&path);
    let entries = reader.read_new(0).unwrap();
    assert!(entries.is_empty());
    assert!(extract_events(&entries, &ctx()).is_empty());
}
