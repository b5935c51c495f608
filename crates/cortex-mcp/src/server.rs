//! The query server: routes MCP requests to memory lookups.
//!
//! Capabilities follow the detected tier — hybrid retrieval at tier 2+,
//! FTS keyword search at tier 1, a plain substring scan at tier 0 — so
//! the same five tools work against any project.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use cortex_core::config::CortexConfig;
use cortex_core::errors::CortexResult;
use cortex_core::event::Event;
use cortex_core::project::identify_project;
use cortex_embeddings::EmbeddingEngine;
use cortex_migration::detect_tier;
use cortex_retrieval::{hybrid_search, search, DEFAULT_RRF_K};
use cortex_storage::{open_event_store, EventStorage};
use tracing::{debug, warn};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};

pub struct QueryServer {
    cwd: PathBuf,
    project_hash: String,
    branch: String,
    store: Box<dyn EventStorage>,
    tier: i32,
    engine: EmbeddingEngine,
    initialized: bool,
}

impl QueryServer {
    /// Resolve the project under `cwd` and open its store.
    pub fn new(cwd: &Path, config: CortexConfig) -> CortexResult<Self> {
        let identity = identify_project(cwd);
        let tier = detect_tier(&identity.hash, &config).max(0);
        let store = open_event_store(&identity.hash, &config)?;
        Ok(Self {
            cwd: identity.path.clone(),
            project_hash: identity.hash,
            branch: identity.git_branch,
            store,
            tier,
            engine: EmbeddingEngine::new(),
            initialized: false,
        })
    }

    /// Handle one request; `None` means notification, send nothing back.
    pub fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "handling MCP request");

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "notifications/initialized" => return None,
            "tools/list" => Ok(self.tools_list()),
            "tools/call" => self.handle_tools_call(request.params),
            "ping" => Ok(json!({})),
            method => {
                warn!(%method, "unknown MCP method");
                Err(JsonRpcError::method_not_found(method))
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self) -> Result<Value, JsonRpcError> {
        self.initialized = true;
        Ok(json!({
            "protocolVersion": MCP_VERSION,
            "serverInfo": {
                "name": "cortex",
                "version": cortex_core::constants::VERSION,
            },
            "capabilities": {
                "tools": {"listChanged": false},
            },
            "instructions": "Cortex is this project's persistent memory. \
                Search past decisions, plans, and context from earlier sessions.",
        }))
    }

    fn tools_list(&self) -> Value {
        let query_schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"},
                "branch": {"type": "string"}
            },
            "required": ["query"]
        });
        let scoped_schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"},
                "branch": {"type": "string"}
            }
        });
        json!({"tools": [
            {
                "name": "cortex_search",
                "description": "Search project memory. Hybrid keyword + semantic on tier 2+, BM25 keyword on tier 1.",
                "inputSchema": query_schema,
            },
            {
                "name": "cortex_search_decisions",
                "description": "List or filter recorded decisions and rejections.",
                "inputSchema": scoped_schema.clone(),
            },
            {
                "name": "cortex_get_plan",
                "description": "The active work plan and its completed steps.",
                "inputSchema": scoped_schema.clone(),
            },
            {
                "name": "cortex_get_recent",
                "description": "Recent events ordered by salience and recency.",
                "inputSchema": scoped_schema,
            },
            {
                "name": "cortex_get_status",
                "description": "Project hash, storage tier, event count, capabilities.",
                "inputSchema": {"type": "object", "properties": {}},
            },
        ]})
    }

    fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        let branch = args
            .get("branch")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.branch.clone());
        let query = args.get("query").and_then(Value::as_str).unwrap_or("");

        let text = match name {
            "cortex_search" => self.tool_search(query, limit, &branch),
            "cortex_search_decisions" => self.tool_search_decisions(query, limit.max(20), &branch),
            "cortex_get_plan" => self.tool_get_plan(&branch),
            "cortex_get_recent" => self.tool_get_recent(limit, &branch),
            "cortex_get_status" => self.tool_get_status(),
            other => return Err(JsonRpcError::method_not_found(other)),
        }
        .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;

        Ok(json!({"content": [{"type": "text", "text": text}]}))
    }

    fn tool_search(&self, query: &str, limit: usize, branch: &str) -> CortexResult<String> {
        if query.trim().is_empty() {
            return Ok("Empty query.".to_string());
        }

        if let Some(sqlite) = self.store.as_sqlite() {
            if self.tier >= 2 && self.engine.is_available() {
                let embedding = self.engine.embed(query);
                let results = hybrid_search(
                    sqlite.conn(),
                    query,
                    embedding.as_deref(),
                    limit,
                    DEFAULT_RRF_K,
                    0.5,
                    0.5,
                    None,
                    Some(branch),
                    0.0,
                )?;
                if results.is_empty() {
                    return Ok(format!("No results found for '{query}'"));
                }
                let mut lines = vec![format!("## Search Results for '{query}'\n")];
                for (index, result) in results.iter().enumerate() {
                    lines.push(format!("### {}. {}", index + 1, result.event.event_type.as_str()));
                    lines.push(format!(
                        "**Score:** {:.3} | **Branch:** {}",
                        result.rrf_score,
                        label(&result.event.git_branch)
                    ));
                    lines.push(format!("\n{}\n", result.event.content));
                }
                return Ok(lines.join("\n"));
            }

            let results = search(sqlite.conn(), query, limit, None, Some(branch))?;
            if results.is_empty() {
                return Ok(format!("No results found for '{query}'"));
            }
            let mut lines = vec![format!("## Search Results for '{query}'\n")];
            for (index, result) in results.iter().enumerate() {
                lines.push(format!("### {}. {}", index + 1, result.event.event_type.as_str()));
                lines.push(format!(
                    "**Score:** {:.3} | **Branch:** {}",
                    result.score,
                    label(&result.event.git_branch)
                ));
                if !result.snippet.is_empty() {
                    lines.push(format!("**Snippet:** ...{}...", result.snippet));
                }
                lines.push(format!("\n{}\n", result.event.content));
            }
            return Ok(lines.join("\n"));
        }

        // Tier 0: substring scan over recent events.
        let needle = query.to_lowercase();
        let matches: Vec<Event> = self
            .store
            .load_recent(100)?
            .into_iter()
            .filter(|e| e.content.to_lowercase().contains(&needle))
            .take(limit)
            .collect();
        if matches.is_empty() {
            return Ok(format!("No results found for '{query}'"));
        }
        let mut lines = vec![format!("## Search Results for '{query}'\n")];
        for (index, event) in matches.iter().enumerate() {
            lines.push(format!("### {}. {}", index + 1, event.event_type.as_str()));
            lines.push(format!("**Branch:** {}", label(&event.git_branch)));
            lines.push(format!("\n{}\n", event.content));
        }
        Ok(lines.join("\n"))
    }

    fn tool_search_decisions(
        &self,
        query: &str,
        limit: usize,
        branch: &str,
    ) -> CortexResult<String> {
        let mut decisions = self.store.load_immortal()?;
        if !branch.is_empty() {
            decisions.retain(|e| e.git_branch == branch || e.git_branch.is_empty());
        }
        if !query.trim().is_empty() {
            let needle = query.to_lowercase();
            decisions.retain(|e| e.content.to_lowercase().contains(&needle));
        }
        decisions.truncate(limit);

        if decisions.is_empty() {
            return Ok("No decisions found.".to_string());
        }
        let mut lines = vec!["## Decisions\n".to_string()];
        for (index, event) in decisions.iter().enumerate() {
            lines.push(format!("### {}. {}", index + 1, event.event_type.as_str()));
            lines.push(format!(
                "**Branch:** {} | **Confidence:** {:.2}",
                label(&event.git_branch),
                event.confidence
            ));
            lines.push(format!("\n{}\n", event.content));
        }
        Ok(lines.join("\n"))
    }

    fn tool_get_plan(&self, branch: &str) -> CortexResult<String> {
        let buckets = self
            .store
            .load_for_briefing((!branch.is_empty()).then_some(branch))?;
        let Some((plan, steps)) = buckets.active_plan.split_first() else {
            return Ok("No active plan found.".to_string());
        };

        let mut lines = vec!["## Active Plan\n".to_string()];
        lines.push(format!("**Branch:** {}\n", label(&plan.git_branch)));
        lines.push(plan.content.clone());
        if !steps.is_empty() {
            lines.push("\n### Completed Steps\n".to_string());
            for step in steps {
                lines.push(format!("- {}", step.content));
            }
        }
        Ok(lines.join("\n"))
    }

    fn tool_get_recent(&self, limit: usize, branch: &str) -> CortexResult<String> {
        let mut events = self.store.load_recent(limit * 2)?;
        if !branch.is_empty() {
            events.retain(|e| e.git_branch == branch || e.git_branch.is_empty());
        }
        events.truncate(limit);

        if events.is_empty() {
            return Ok("No recent events found.".to_string());
        }
        let mut lines = vec!["## Recent Events\n".to_string()];
        for (index, event) in events.iter().enumerate() {
            lines.push(format!("### {}. {}", index + 1, event.event_type.as_str()));
            lines.push(format!(
                "**Salience:** {:.2} | **Branch:** {}",
                event.salience,
                label(&event.git_branch)
            ));
            lines.push(format!("\n{}\n", event.content));
        }
        Ok(lines.join("\n"))
    }

    fn tool_get_status(&self) -> CortexResult<String> {
        let tier_name = match self.tier {
            0 => "JSON",
            1 => "SQLite + FTS5",
            2 => "SQLite + Embeddings",
            _ => "MCP + Projections",
        };
        let mut lines = vec![
            "## Cortex Status\n".to_string(),
            format!("**Project:** {}", self.cwd.display()),
            format!("**Hash:** {}", self.project_hash),
            format!("**Storage Tier:** {} ({})", self.tier, tier_name),
            format!("**Events:** {}", self.store.count()?),
        ];
        if self.tier >= 2 {
            if let Some(sqlite) = self.store.as_sqlite() {
                lines.push(format!("**Embeddings:** {}", sqlite.count_embeddings()?));
                lines.push(format!(
                    "**Hybrid Search:** {}",
                    if self.engine.is_available() {
                        "available"
                    } else {
                        "unavailable"
                    }
                ));
            }
        }
        if !self.branch.is_empty() {
            lines.push(format!("**Current Branch:** {}", self.branch));
        }
        Ok(lines.join("\n"))
    }
}

fn label(branch: &str) -> &str {
    if branch.is_empty() {
        "unknown"
    } else {
        branch
    }
}
