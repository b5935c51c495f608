//! The event model: typed events extracted from assistant transcripts.
//!
//! Events are immutable facts. They are appended exactly once (deduplicated
//! by content hash), reinforced on access, and never otherwise mutated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants::SHORT_HASH_LEN;
use crate::errors::{CortexResult, EventError};
use crate::time::now_iso;

/// Typed categories of events captured by Cortex.
///
/// Each type has a default salience score and an immortality flag; see
/// [`EventType::default_salience`] and [`EventType::is_immortal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DecisionMade,
    ApproachRejected,
    PlanCreated,
    PlanStepCompleted,
    KnowledgeAcquired,
    ErrorResolved,
    PreferenceNoted,
    TaskCompleted,
    FileModified,
    FileExplored,
    CommandRun,
}

impl EventType {
    /// All event types, in salience order from decisions down to commands.
    pub const ALL: [EventType; 11] = [
        EventType::DecisionMade,
        EventType::ApproachRejected,
        EventType::PlanCreated,
        EventType::PreferenceNoted,
        EventType::ErrorResolved,
        EventType::PlanStepCompleted,
        EventType::KnowledgeAcquired,
        EventType::TaskCompleted,
        EventType::FileModified,
        EventType::FileExplored,
        EventType::CommandRun,
    ];

    /// The wire/database name of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::DecisionMade => "decision_made",
            EventType::ApproachRejected => "approach_rejected",
            EventType::PlanCreated => "plan_created",
            EventType::PlanStepCompleted => "plan_step_completed",
            EventType::KnowledgeAcquired => "knowledge_acquired",
            EventType::ErrorResolved => "error_resolved",
            EventType::PreferenceNoted => "preference_noted",
            EventType::TaskCompleted => "task_completed",
            EventType::FileModified => "file_modified",
            EventType::FileExplored => "file_explored",
            EventType::CommandRun => "command_run",
        }
    }

    /// Parse the wire name back into a type.
    pub fn parse(raw: &str) -> Option<EventType> {
        EventType::ALL.iter().copied().find(|t| t.as_str() == raw)
    }

    /// Default salience per type. Higher-salience events survive decay
    /// longer in briefings; decisions matter most, commands least.
    pub fn default_salience(self) -> f64 {
        match self {
            EventType::DecisionMade | EventType::ApproachRejected => 0.9,
            EventType::PlanCreated => 0.85,
            EventType::PreferenceNoted => 0.8,
            EventType::ErrorResolved => 0.75,
            EventType::PlanStepCompleted | EventType::KnowledgeAcquired => 0.7,
            EventType::TaskCompleted => 0.6,
            EventType::FileModified => 0.4,
            EventType::FileExplored => 0.3,
            EventType::CommandRun => 0.2,
        }
    }

    /// Whether events of this type never decay. "Why did we choose X?"
    /// can arise at any point in a project's lifetime, so decisions and
    /// rejections are retained permanently.
    pub fn is_immortal(self) -> bool {
        matches!(self, EventType::DecisionMade | EventType::ApproachRejected)
    }

    /// Human-readable label, e.g. `Decision Made`.
    pub fn title(self) -> String {
        self.as_str()
            .split('_')
            .map(|w| {
                let mut c = w.chars();
                match c.next() {
                    Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A single captured event in the Cortex memory system.
///
/// Timestamps are RFC 3339 UTC strings; see [`crate::time`] for why they
/// stay strings end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// UUID v4 identifier.
    pub id: String,
    /// Session the event was extracted in (opaque host string).
    #[serde(default)]
    pub session_id: String,
    /// Project path or hash the event belongs to.
    #[serde(default)]
    pub project: String,
    /// Git branch at extraction time; may be empty.
    #[serde(default)]
    pub git_branch: String,
    /// The type of this event.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event content (non-empty by construction).
    #[serde(default)]
    pub content: String,
    /// Free-form per-event metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Prior importance in [0, 1].
    pub salience: f64,
    /// Extractor confidence in [0, 1].
    pub confidence: f64,
    /// Creation timestamp.
    pub created_at: String,
    /// Last access timestamp; always >= created_at.
    pub accessed_at: String,
    /// Number of times this event was retrieved.
    #[serde(default)]
    pub access_count: u64,
    /// True exactly for decision/rejection events.
    #[serde(default)]
    pub immortal: bool,
    /// Which extraction layer produced this: structural/semantic/explicit.
    #[serde(default)]
    pub provenance: String,
}

impl Event {
    /// Start building an event of the given type and content. `build`
    /// fills in the id, timestamps, default salience, and immortality.
    pub fn builder(event_type: EventType, content: impl Into<String>) -> EventBuilder {
        EventBuilder {
            event_type,
            content: content.into(),
            session_id: String::new(),
            project: String::new(),
            git_branch: String::new(),
            metadata: Map::new(),
            confidence: 1.0,
            provenance: String::new(),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Builder for [`Event`] with the factory defaults applied at `build`.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event_type: EventType,
    content: String,
    session_id: String,
    project: String,
    git_branch: String,
    metadata: Map<String, Value>,
    confidence: f64,
    provenance: String,
}

impl EventBuilder {
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn git_branch(mut self, git_branch: impl Into<String>) -> Self {
        self.git_branch = git_branch.into();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = provenance.into();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Finalise the event. Fails with `InvalidEvent` when the content is
    /// empty after trimming.
    pub fn build(self) -> CortexResult<Event> {
        if self.content.trim().is_empty() {
            return Err(EventError::InvalidEvent {
                reason: "content must not be empty".to_string(),
            }
            .into());
        }
        let now = now_iso();
        Ok(Event {
            id: Uuid::new_v4().to_string(),
            session_id: self.session_id,
            project: self.project,
            git_branch: self.git_branch,
            event_type: self.event_type,
            content: self.content,
            metadata: self.metadata,
            salience: self.event_type.default_salience(),
            confidence: self.confidence,
            created_at: now.clone(),
            accessed_at: now,
            access_count: 0,
            immortal: self.event_type.is_immortal(),
            provenance: self.provenance,
        })
    }
}

/// Deduplication hash for an event: SHA-256 over `type:content:session_id`,
/// truncated to 16 hex chars. The same content in a different session hashes
/// differently and is preserved — restating is signal.
pub fn content_hash(event: &Event) -> String {
    hash_parts(event.event_type.as_str(), &event.content, &event.session_id)
}

/// Hash the three dedup key parts directly. The SQLite tier uses this to
/// compute hashes from projected columns without materialising full events.
pub fn hash_parts(type_name: &str, content: &str, session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_name.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    hasher.update(b":");
    hasher.update(session_id.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(SHORT_HASH_LEN);
    for byte in digest.iter().take(SHORT_HASH_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_factory_defaults() {
        let e = Event::builder(EventType::DecisionMade, "Use SQLite")
            .session_id("s1")
            .build()
            .unwrap();
        assert!(e.immortal);
        assert!((e.salience - 0.9).abs() < f64::EPSILON);
        assert_eq!(e.access_count, 0);
        assert_eq!(e.created_at, e.accessed_at);
        assert!(!e.id.is_empty());
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(Event::builder(EventType::CommandRun, "   ").build().is_err());
        assert!(Event::builder(EventType::CommandRun, "").build().is_err());
    }

    #[test]
    fn immortality_tracks_type_exactly() {
        for ty in EventType::ALL {
            let e = Event::builder(ty, "x").build().unwrap();
            assert_eq!(e.immortal, ty.is_immortal());
        }
        assert!(EventType::DecisionMade.is_immortal());
        assert!(EventType::ApproachRejected.is_immortal());
        assert!(!EventType::KnowledgeAcquired.is_immortal());
    }

    #[test]
    fn content_hash_is_16_hex_and_session_scoped() {
        let a = Event::builder(EventType::KnowledgeAcquired, "fact")
            .session_id("s1")
            .build()
            .unwrap();
        let mut b = a.clone();
        b.session_id = "s2".to_string();

        let ha = content_hash(&a);
        let hb = content_hash(&b);
        assert_eq!(ha.len(), 16);
        assert!(ha.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(ha, hb, "different sessions must hash differently");
    }

    #[test]
    fn content_hash_ignores_id_and_timestamps() {
        let a = Event::builder(EventType::DecisionMade, "same")
            .session_id("s")
            .build()
            .unwrap();
        let b = Event::builder(EventType::DecisionMade, "same")
            .session_id("s")
            .build()
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn type_names_round_trip() {
        for ty in EventType::ALL {
            assert_eq!(EventType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::parse("not_a_type"), None);
    }

    #[test]
    fn serde_uses_snake_case_type_tag() {
        let e = Event::builder(EventType::FileModified, "Modified: /a.rs")
            .build()
            .unwrap();
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "file_modified");
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type, EventType::FileModified);
    }

    #[test]
    fn title_case_labels() {
        assert_eq!(EventType::DecisionMade.title(), "Decision Made");
        assert_eq!(EventType::CommandRun.title(), "Command Run");
    }
}
