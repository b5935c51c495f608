//! Hybrid retrieval scenario: events present in both keyword and vector
//! top-k must fuse to the top, and the capsule must carry rank indicators.

use cortex_core::config::CortexConfig;
use cortex_core::event::{Event, EventType};
use cortex_embeddings::EmbeddingEngine;
use cortex_retrieval::{hybrid_search, write_relevant_context_to_file, DEFAULT_RRF_K};
use cortex_storage::{EventStorage, SqliteEventStore};

fn seeded() -> (tempfile::TempDir, SqliteEventStore, EmbeddingEngine) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEventStore::open_at(&dir.path().join("events.db")).unwrap();
    let engine = EmbeddingEngine::new();

    let contents = [
        (EventType::DecisionMade, "Use SQLite for storage"),
        (EventType::KnowledgeAcquired, "SQLite has FTS5"),
        (EventType::PreferenceNoted, "prefer small composable crates"),
        (EventType::CommandRun, "cargo clippy --all-targets"),
        (EventType::ErrorResolved, "fixed flaky network test"),
    ];
    for (ty, content) in contents {
        let event = Event::builder(ty, content)
            .session_id("s1")
            .git_branch("main")
            .build()
            .unwrap();
        let id = event.id.clone();
        store.append_many(vec![event]).unwrap();
        store
            .store_embedding(&id, &engine.embed(content).unwrap())
            .unwrap();
    }
    (dir, store, engine)
}

#[test]
fn doubly_ranked_event_wins_fusion() {
    let (_dir, store, engine) = seeded();
    let prompt = "SQLite storage";
    let embedding = engine.embed(prompt).unwrap();

    let results = hybrid_search(
        store.conn(),
        prompt,
        Some(&embedding),
        5,
        DEFAULT_RRF_K,
        0.5,
        0.5,
        None,
        Some("main"),
        0.0,
    )
    .unwrap();

    let contents: Vec<&str> = results.iter().map(|r| r.event.content.as_str()).collect();
    assert!(contents.contains(&"Use SQLite for storage"));
    assert!(contents.contains(&"SQLite has FTS5"));

    // The winner appears in both subsystems' rankings.
    assert!(results[0].fts_rank.is_some());
    assert!(results[0].vec_rank.is_some());
    assert!(results[0].event.content.contains("SQLite"));
    // Scores are monotonically non-increasing.
    for pair in results.windows(2) {
        assert!(pair[0].rrf_score >= pair[1].rrf_score);
    }
}

#[test]
fn keyword_only_degradation_without_embedding() {
    let (_dir, store, _engine) = seeded();
    let results = hybrid_search(
        store.conn(),
        "SQLite",
        None,
        5,
        DEFAULT_RRF_K,
        0.5,
        0.5,
        None,
        None,
        0.0,
    )
    .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.vec_rank.is_none()));
    assert!(results.iter().all(|r| r.fts_rank.is_some()));
}

#[test]
fn vector_only_degradation_without_query_text() {
    let (_dir, store, engine) = seeded();
    let embedding = engine.embed("storage engines").unwrap();
    let results = hybrid_search(
        store.conn(),
        "",
        Some(&embedding),
        5,
        DEFAULT_RRF_K,
        0.5,
        0.5,
        None,
        None,
        0.0,
    )
    .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.fts_rank.is_none()));
}

#[test]
fn capsule_file_lifecycle() {
    let (dir, store, engine) = seeded();
    let mut config = CortexConfig::default();
    config.storage_tier = 2;
    let capsule = dir.path().join(".claude/rules/cortex-relevant-context.md");

    // A matching prompt writes the capsule with rank indicators.
    let wrote = write_relevant_context_to_file(
        &capsule,
        &store as &dyn EventStorage,
        &config,
        &engine,
        "SQLite storage",
        Some("main"),
    )
    .unwrap();
    assert!(wrote);
    let md = std::fs::read_to_string(&capsule).unwrap();
    assert!(md.starts_with("# Relevant Context"));
    assert!(md.contains("keyword #"));
    assert!(md.contains("semantic #"));
    assert!(md.len() <= 2000);

    // A whitespace prompt deletes the stale capsule.
    let wrote = write_relevant_context_to_file(
        &capsule,
        &store as &dyn EventStorage,
        &config,
        &engine,
        "   ",
        Some("main"),
    )
    .unwrap();
    assert!(!wrote);
    assert!(!capsule.exists());
}

#[test]
fn tier_below_two_writes_nothing() {
    let (dir, store, engine) = seeded();
    let config = CortexConfig::default(); // tier 0
    let capsule = dir.path().join("capsule.md");

    let wrote = write_relevant_context_to_file(
        &capsule,
        &store as &dyn EventStorage,
        &config,
        &engine,
        "SQLite storage",
        None,
    )
    .unwrap();
    assert!(!wrote);
    assert!(!capsule.exists());
}
