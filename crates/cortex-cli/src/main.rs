//! The `cortex` binary.
//!
//! Hook verbs read their JSON payload from stdin and always exit 0;
//! management verbs exit 1 on irrecoverable errors.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cortex_core::config::load_config;
use cortex_hooks::{
    handle_precompact, handle_session_start, handle_stop, handle_user_prompt_submit, read_payload,
};

#[derive(Parser)]
#[command(name = "cortex", version, about = "Per-project persistent memory for a coding assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Session-end hook (payload on stdin).
    Stop {
        /// Also regenerate tier-3 markdown projections.
        #[arg(long)]
        regenerate_projections: bool,
    },
    /// Pre-compaction hook (payload on stdin).
    Precompact,
    /// Session-start hook (payload on stdin).
    SessionStart,
    /// Per-prompt anticipatory retrieval hook (payload on stdin, tier 2+).
    UserPromptSubmit,
    /// Clear the event store and hook state for the current project.
    Reset,
    /// Show project identity, storage tier, and store statistics.
    Status,
    /// Print the host hook configuration JSON.
    Init,
    /// Migrate the current project to the next storage tier.
    Upgrade {
        /// Report what would be done without making changes.
        #[arg(long, short = 'n')]
        dry_run: bool,
        /// Proceed even when the target already exists.
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Start the MCP query server on stdio (tier 3).
    McpServer,
}

fn main() {
    // Hook stdout belongs to the host; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Stop {
            regenerate_projections,
        } => handle_stop(&read_payload(), regenerate_projections),
        Command::Precompact => handle_precompact(&read_payload()),
        Command::SessionStart => handle_session_start(&read_payload()),
        Command::UserPromptSubmit => handle_user_prompt_submit(&read_payload()),
        Command::Reset => commands::cmd_reset(),
        Command::Status => commands::cmd_status(),
        Command::Init => commands::cmd_init(),
        Command::Upgrade { dry_run, force } => commands::cmd_upgrade(dry_run, force),
        Command::McpServer => match std::env::current_dir() {
            Ok(cwd) => cortex_mcp::run_server(&cwd, load_config(None)),
            Err(e) => {
                eprintln!("Cortex MCP server error: {e}");
                1
            }
        },
    };
    std::process::exit(code);
}
