//! Transcript record and content-block model.
//!
//! Each transcript line is a JSON record with a `type` discriminator:
//! `summary`, `file-history-snapshot`, `user`, or `assistant`. Only the
//! last two carry conversation content. Content blocks are parsed one by
//! one so a single unrecognised block never discards the whole entry.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// Who produced a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A discriminated content block inside a conversation entry.
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Only appears on user entries: the host echoes each tool result as a
    /// user message. `metadata` carries tool-specific side information such
    /// as `{"oldTodos": …, "newTodos": …}` for plan-update tools.
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
        metadata: Value,
    },
}

impl ContentBlock {
    /// Parse a single block, returning `None` for unknown shapes.
    fn from_value(value: &Value) -> Option<ContentBlock> {
        match value.get("type").and_then(Value::as_str)? {
            "text" => Some(ContentBlock::Text {
                text: value.get("text").and_then(Value::as_str)?.to_string(),
            }),
            "thinking" => Some(ContentBlock::Thinking {
                thinking: value
                    .get("thinking")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "tool_use" => Some(ContentBlock::ToolUse {
                id: value
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: value.get("name").and_then(Value::as_str)?.to_string(),
                input: value.get("input").cloned().unwrap_or(Value::Null),
            }),
            "tool_result" => Some(ContentBlock::ToolResult {
                tool_use_id: value
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: value.get("content").cloned().unwrap_or(Value::Null),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                metadata: Value::Null,
            }),
            _ => None,
        }
    }
}

/// A parsed `user` or `assistant` transcript entry.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub role: Role,
    pub session_id: String,
    pub uuid: String,
    pub parent_uuid: String,
    pub timestamp: String,
    pub git_branch: String,
    pub cwd: String,
    pub blocks: Vec<ContentBlock>,
}

impl TranscriptEntry {
    /// Concatenation of all `text` blocks.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        for block in &self.blocks {
            if let ContentBlock::Text { text } = block {
                parts.push(text.as_str());
            }
        }
        parts.join("\n")
    }

    /// All tool-use blocks as `(name, input)` pairs.
    pub fn tool_uses(&self) -> Vec<(&str, &Value)> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
                _ => None,
            })
            .collect()
    }

    /// All tool-result blocks as `(tool_use_id, content, is_error)` views.
    pub fn tool_results(&self) -> Vec<(&str, &Value, bool)> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                    ..
                } => Some((tool_use_id.as_str(), content, *is_error)),
                _ => None,
            })
            .collect()
    }

    /// Metadata values of all tool-result blocks.
    pub fn tool_result_metadata(&self) -> Vec<&Value> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { metadata, .. } if !metadata.is_null() => Some(metadata),
                _ => None,
            })
            .collect()
    }
}

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("fenced code regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("inline code regex"));

/// Remove fenced and inline code spans before semantic keyword scanning,
/// so `Decision:` inside a code sample is not mistaken for prose.
pub fn strip_code_blocks(text: &str) -> String {
    let without_fences = FENCED_CODE.replace_all(text, "");
    INLINE_CODE.replace_all(&without_fences, "").into_owned()
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default, rename = "sessionId")]
    session_id: String,
    #[serde(default)]
    uuid: String,
    #[serde(default, rename = "parentUuid")]
    parent_uuid: Option<String>,
    #[serde(default)]
    timestamp: String,
    #[serde(default, rename = "gitBranch")]
    git_branch: String,
    #[serde(default)]
    cwd: String,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default, rename = "toolUseResult")]
    tool_use_result: Option<Value>,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Value,
}

/// Parse one transcript line. Returns `None` for metadata records
/// (`summary`, `file-history-snapshot`), unknown record types, and
/// malformed JSON — callers skip and continue.
pub fn parse_record(line: &str) -> Option<TranscriptEntry> {
    let raw: RawRecord = serde_json::from_str(line).ok()?;
    let role = match raw.record_type.as_str() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => return None,
    };

    let message = raw.message?;
    let mut blocks = Vec::new();
    match &message.content {
        // Plain-string user content is shorthand for one text block.
        Value::String(text) => blocks.push(ContentBlock::Text { text: text.clone() }),
        Value::Array(items) => {
            for item in items {
                if let Some(block) = ContentBlock::from_value(item) {
                    blocks.push(block);
                }
            }
        }
        _ => {}
    }

    // The record-level toolUseResult envelope belongs to the echoed
    // tool-result block(s); attach it as their metadata.
    if let Some(envelope) = raw.tool_use_result {
        for block in &mut blocks {
            if let ContentBlock::ToolResult { metadata, .. } = block {
                *metadata = envelope.clone();
            }
        }
    }

    Some(TranscriptEntry {
        role,
        session_id: raw.session_id,
        uuid: raw.uuid,
        parent_uuid: raw.parent_uuid.unwrap_or_default(),
        timestamp: raw.timestamp,
        git_branch: raw.git_branch,
        cwd: raw.cwd,
        blocks,
    })
}
