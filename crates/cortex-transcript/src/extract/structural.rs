//! Layer 1: structural extraction from tool-call observation.
//!
//! Assistant tool-use blocks map to at most one event each; unknown tool
//! names produce nothing. User entries carrying a todo-update envelope
//! yield one plan_step_completed per todo that transitioned to completed.

use std::collections::HashMap;

use cortex_core::event::{Event, EventType};
use serde_json::{json, Value};

use crate::entry::{Role, TranscriptEntry};
use crate::extract::ExtractionContext;

pub fn extract(entry: &TranscriptEntry, ctx: &ExtractionContext) -> Vec<Event> {
    match entry.role {
        Role::Assistant => extract_tool_calls(entry, ctx),
        Role::User => extract_plan_steps(entry, ctx),
    }
}

fn extract_tool_calls(entry: &TranscriptEntry, ctx: &ExtractionContext) -> Vec<Event> {
    let mut events = Vec::new();
    for (name, input) in entry.tool_uses() {
        let draft = match name {
            "Write" | "Edit" => str_field(input, "file_path").map(|path| {
                Event::builder(EventType::FileModified, format!("Modified: {path}"))
                    .metadata("tool", json!(name))
            }),
            "Bash" => str_field(input, "command").map(|command| {
                let mut builder = Event::builder(EventType::CommandRun, command);
                if let Some(desc) = str_field(input, "description") {
                    builder = builder.metadata("description", json!(desc));
                }
                builder
            }),
            "Read" | "Glob" | "Grep" => primary_target(input)
                .map(|target| Event::builder(EventType::FileExplored, target)),
            "TodoWrite" => format_todos(input).map(|(listing, count)| {
                Event::builder(EventType::PlanCreated, listing)
                    .metadata("todo_count", json!(count))
            }),
            _ => None,
        };

        let Some(draft) = draft else { continue };
        let built = draft
            .session_id(&ctx.session_id)
            .project(&ctx.project)
            .git_branch(ctx.branch_for(entry))
            .provenance("structural")
            .build();
        if let Ok(event) = built {
            events.push(event);
        }
    }
    events
}

/// For user entries: scan tool-result envelopes for `oldTodos`/`newTodos`
/// and emit one event per `pending | in_progress → completed` transition.
fn extract_plan_steps(entry: &TranscriptEntry, ctx: &ExtractionContext) -> Vec<Event> {
    let mut events = Vec::new();
    for envelope in entry.tool_result_metadata() {
        let (Some(old), Some(new)) = (
            envelope.get("oldTodos").and_then(Value::as_array),
            envelope.get("newTodos").and_then(Value::as_array),
        ) else {
            continue;
        };

        let old_status: HashMap<&str, &str> = old
            .iter()
            .filter_map(|t| {
                Some((
                    t.get("content")?.as_str()?,
                    t.get("status")?.as_str()?,
                ))
            })
            .collect();

        for todo in new {
            let (Some(content), Some(status)) = (
                todo.get("content").and_then(Value::as_str),
                todo.get("status").and_then(Value::as_str),
            ) else {
                continue;
            };
            if status != "completed" {
                continue;
            }
            let was = old_status.get(content).copied();
            if !matches!(was, Some("pending") | Some("in_progress")) {
                continue;
            }
            let built = Event::builder(EventType::PlanStepCompleted, content)
                .session_id(&ctx.session_id)
                .project(&ctx.project)
                .git_branch(ctx.branch_for(entry))
                .provenance("structural")
                .build();
            if let Ok(event) = built {
                events.push(event);
            }
        }
    }
    events
}

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Primary path or pattern of an exploration tool.
fn primary_target(input: &Value) -> Option<&str> {
    str_field(input, "file_path")
        .or_else(|| str_field(input, "pattern"))
        .or_else(|| str_field(input, "path"))
}

/// Render a todo list as a markdown checklist; returns the listing and the
/// todo count.
fn format_todos(input: &Value) -> Option<(String, usize)> {
    let todos = input.get("todos").and_then(Value::as_array)?;
    if todos.is_empty() {
        return None;
    }
    let mut lines = Vec::with_capacity(todos.len());
    for todo in todos {
        let content = todo.get("content").and_then(Value::as_str).unwrap_or("");
        if content.is_empty() {
            continue;
        }
        let marker = match todo.get("status").and_then(Value::as_str) {
            Some("completed") => "x",
            Some("in_progress") => "~",
            _ => " ",
        };
        lines.push(format!("- [{marker}] {content}"));
    }
    if lines.is_empty() {
        return None;
    }
    Some((lines.join("\n"), todos.len()))
}
