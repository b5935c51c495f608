//! # cortex-mcp
//!
//! Tier-3 mid-session query surface: an MCP server over stdio exposing
//! search, decisions, plan, recent-events, and status tools against the
//! project's event store.

pub mod protocol;
pub mod server;
pub mod stdio;

use std::path::Path;

use cortex_core::config::CortexConfig;

pub use server::QueryServer;

/// Entry point for `cortex mcp-server`: resolve the project under `cwd`
/// and serve until stdin closes. Returns a process exit code.
pub fn run_server(cwd: &Path, config: CortexConfig) -> i32 {
    match QueryServer::new(cwd, config) {
        Ok(server) => match stdio::serve(server) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Cortex MCP server error: {e}");
                1
            }
        },
        Err(e) => {
            eprintln!("Cortex MCP server error: {e}");
            1
        }
    }
}
