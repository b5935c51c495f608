//! Management commands: reset, status, init, upgrade.

use std::path::Path;

use serde_json::json;

use cortex_core::config::load_config;
use cortex_core::project::identify_project;
use cortex_embeddings::EmbeddingEngine;
use cortex_migration::{migration_status, upgrade, MigrationStatus};
use cortex_storage::{db, open_event_store, HookState, HookStateFile};

fn tier_name(tier: i32) -> &'static str {
    match tier {
        -1 => "None",
        0 => "JSON",
        1 => "SQLite",
        2 => "SQLite + Embeddings",
        3 => "MCP + Projections",
        _ => "Unknown",
    }
}

fn current_dir() -> Option<std::path::PathBuf> {
    std::env::current_dir().ok()
}

/// Clear the event store and hook state for the project in the current
/// working directory.
pub fn cmd_reset() -> i32 {
    let Some(cwd) = current_dir() else {
        eprintln!("Cortex reset: no cwd.");
        return 1;
    };
    let identity = identify_project(&cwd);
    let config = load_config(None);

    let run = || -> cortex_core::errors::CortexResult<()> {
        let store = open_event_store(&identity.hash, &config)?;
        store.clear()?;
        HookStateFile::new(&identity.hash, &config)?.save(&HookState::default())?;
        Ok(())
    };
    match run() {
        Ok(()) => {
            println!("Cortex memory reset for project {}.", identity.hash);
            0
        }
        Err(e) => {
            eprintln!("Cortex reset error: {e}");
            1
        }
    }
}

/// Print project identity, event count, storage tier, and tier-specific
/// statistics.
pub fn cmd_status() -> i32 {
    let Some(cwd) = current_dir() else {
        eprintln!("Cortex status: no cwd.");
        return 1;
    };
    let identity = identify_project(&cwd);
    let config = load_config(None);

    let run = || -> cortex_core::errors::CortexResult<()> {
        let store = open_event_store(&identity.hash, &config)?;
        let state = HookStateFile::new(&identity.hash, &config)?.load();
        let status = migration_status(&identity.hash, &config);

        println!("project: {}", identity.path.display());
        println!("hash: {}", identity.hash);
        println!(
            "storage_tier: {} ({})",
            status.current_tier,
            tier_name(status.current_tier)
        );
        println!("events: {}", store.count()?);
        let last_extraction = if state.last_extraction_time.is_empty() {
            "none".to_string()
        } else {
            state.last_extraction_time
        };
        println!("last_extraction: {last_extraction}");

        if status.current_tier >= 1 {
            if let Some(sqlite) = store.as_sqlite() {
                if let Ok(meta) = std::fs::metadata(sqlite.db_path()) {
                    println!("db_size: {}", format_size(meta.len()));
                }
                let stats = db::database_stats(sqlite.conn())?;
                println!("fts5_available: {}", yes_no(stats.fts_enabled));

                if status.current_tier >= 2 {
                    println!("embeddings: {}/{}", stats.events_with_embeddings, stats.event_count);
                    println!("auto_embed: {}", yes_no(config.auto_embed));
                }
            }
        }

        if status.current_tier >= 3 || config.mcp_enabled || config.projections_enabled {
            println!("mcp_enabled: {}", yes_no(config.mcp_enabled));
            println!("projections_enabled: {}", yes_no(config.projections_enabled));
        }

        if status.current_tier == 0 && status.can_upgrade {
            println!("upgrade: run 'cortex upgrade' to migrate to SQLite");
        }
        Ok(())
    };

    match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Cortex status error: {e}");
            1
        }
    }
}

/// Hook configuration JSON for the host settings file.
pub fn get_init_hook_json(include_tier2: bool, include_tier3: bool) -> String {
    let stop_command = if include_tier3 {
        "cortex stop --regenerate-projections"
    } else {
        "cortex stop"
    };
    let entry = |command: &str| {
        json!([{"matcher": "", "hooks": [{"type": "command", "command": command}]}])
    };

    let mut hooks = json!({
        "Stop": entry(stop_command),
        "PreCompact": entry("cortex precompact"),
        "SessionStart": entry("cortex session-start"),
    });
    if include_tier2 {
        hooks["UserPromptSubmit"] = entry("cortex user-prompt-submit");
    }

    serde_json::to_string_pretty(&json!({"hooks": hooks})).unwrap_or_default()
}

/// Print hook configuration for copy-paste into the host settings.
pub fn cmd_init() -> i32 {
    let config = load_config(None);
    let include_tier2 = config.storage_tier >= 2 || config.auto_embed;
    let include_tier3 = config.storage_tier >= 3 || config.projections_enabled;
    println!("{}", get_init_hook_json(include_tier2, include_tier3));

    if include_tier3 {
        eprintln!("\n# Tier 3 detected: projections regenerated on Stop");
        eprintln!("# To enable the query server, add to the host settings:");
        eprintln!("#   mcpServers: {{ cortex: {{ command: 'cortex', args: ['mcp-server'] }} }}");
    } else if include_tier2 {
        eprintln!("\n# Tier 2+ detected: UserPromptSubmit hook included for anticipatory retrieval");
    } else {
        eprintln!("\n# Tip: upgrade to Tier 2 and re-run 'cortex init' for anticipatory retrieval");
    }
    0
}

/// Migrate the current project to the next storage tier.
pub fn cmd_upgrade(dry_run: bool, force: bool) -> i32 {
    let Some(cwd) = current_dir() else {
        eprintln!("Cortex upgrade: no cwd.");
        return 1;
    };
    let identity = identify_project(&cwd);
    let config = load_config(None);
    let engine = EmbeddingEngine::new();

    let status = migration_status(&identity.hash, &config);
    print_upgrade_header(&identity.path, &status, &engine);

    if !status.can_upgrade && !force {
        println!("\n{}", status.details);
        return 1;
    }

    if dry_run {
        print_dry_run_plan(&status);
        return 0;
    }

    println!(
        "\nUpgrading to Tier {} ({})...",
        status.target_tier,
        tier_name(status.target_tier)
    );
    let mut progress = |done: usize, total: usize| {
        print!("  Generating embeddings: {done}/{total}\r");
    };
    let result = upgrade(&identity.hash, &config, &engine, false, force, Some(&mut progress));

    if result.success {
        println!("\nUpgrade complete!");
        match result.from_tier {
            0 => {
                println!("  events_migrated: {}", result.events_migrated);
                println!("  hook_state_migrated: {}", yes_no(result.hook_state_migrated));
                if let Some(backup) = &result.backup_path {
                    println!("  backup: {}", backup.display());
                }
            }
            1 => println!("  embeddings_generated: {}", result.embeddings_generated),
            2 => {
                println!("  mcp_enabled: yes");
                println!("  projections_enabled: yes");
            }
            _ => {}
        }
        println!(
            "\nRun 'cortex init' to update your hooks for Tier {}.",
            result.to_tier
        );
        0
    } else {
        eprintln!(
            "\nUpgrade failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        if let Some(backup) = &result.backup_path {
            eprintln!("Rollback with the backup at {}", backup.display());
        }
        1
    }
}

fn print_upgrade_header(path: &Path, status: &MigrationStatus, engine: &EmbeddingEngine) {
    println!("project: {}", path.display());
    println!(
        "current_tier: {} ({})",
        status.current_tier,
        tier_name(status.current_tier)
    );
    println!("events: {}", status.events_count);
    if status.current_tier == 0 {
        println!("hook_state: {}", yes_no(status.has_hook_state));
    }
    if status.current_tier >= 1 {
        println!("embeddings: {}/{}", status.embedding_count, status.events_count);
        println!(
            "embedding_provider: {}",
            if engine.is_available() {
                engine.provider_name()
            } else {
                "not available"
            }
        );
    }
}

fn print_dry_run_plan(status: &MigrationStatus) {
    println!(
        "\n[DRY RUN] Would upgrade to Tier {} ({}):",
        status.target_tier,
        tier_name(status.target_tier)
    );
    match status.current_tier {
        0 => {
            println!("  - Backup existing files");
            println!("  - Migrate {} events to SQLite", status.events_count);
            if status.has_hook_state {
                println!("  - Migrate hook state");
            }
            println!("  - Archive JSON files");
        }
        1 => {
            let pending = status.events_count - status.embedding_count.min(status.events_count);
            println!("  - Generate embeddings for {pending} events");
            println!("  - (After upgrade, run 'cortex init' to enable anticipatory retrieval)");
        }
        2 => {
            println!("  - Enable the MCP query server for mid-session memory queries");
            println!("  - Enable markdown projections (.cortex/decisions.md, ...)");
            println!("  - (After upgrade, run 'cortex init' to configure the MCP server)");
        }
        _ => {}
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
