//! Transcript discovery for hooks that do not receive a transcript path.
//!
//! The host keeps per-project transcripts under
//! `~/.claude/projects/<derived-name>/*.jsonl`, where the directory name is
//! the project path with every non-alphanumeric character flattened to `-`.

use std::path::{Path, PathBuf};

/// Directory name the host derives from a project path.
pub fn derived_dir_name(project_path: &Path) -> String {
    project_path
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// The host's transcript directory for a project, if a home directory can
/// be resolved. The directory may not exist.
pub fn transcript_dir_for(project_path: &Path) -> Option<PathBuf> {
    let home = directories::BaseDirs::new()?.home_dir().to_path_buf();
    Some(
        home.join(".claude")
            .join("projects")
            .join(derived_dir_name(project_path)),
    )
}

/// Most recently modified non-agent `.jsonl` transcript in a directory.
/// Sub-agent transcripts (prefixed `agent-`) are excluded: they describe
/// delegated work, not the main conversation.
pub fn find_latest_transcript(dir: &Path) -> Option<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir).ok()? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("agent-") {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        match &newest {
            Some((best, _)) if *best >= modified => {}
            _ => newest = Some((modified, path)),
        }
    }
    newest.map(|(_, path)| path)
}
