//! Project identity resolution.
//!
//! Canonicalises a working directory to a stable 16-hex-char hash and reads
//! git metadata best-effort. Nothing here raises: a non-git directory, a
//! missing `git` binary, or a hung subprocess all degrade to `unknown` /
//! empty fields.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::constants::{GIT_TIMEOUT_SECS, SHORT_HASH_LEN};

/// Git metadata for a project directory. All fields fall back to
/// `unknown` / empty strings rather than erroring.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct GitInfo {
    pub branch: String,
    pub last_commit_hash: String,
    pub last_commit_time: String,
}

/// A resolved project identity.
#[derive(Debug, Clone)]
pub struct ProjectIdentity {
    /// Canonical absolute path of the working directory.
    pub path: PathBuf,
    /// First 16 hex chars of SHA-256 over the canonical path.
    pub hash: String,
    /// Current git branch, `unknown` outside a repository.
    pub git_branch: String,
    pub git_info: GitInfo,
}

/// Resolve a path to its canonical absolute form. Works for paths that do
/// not exist yet (falls back to joining the process cwd).
fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Deterministic 16-hex-char hash of a project directory, used to isolate
/// projects under `~/.cortex/projects/`.
pub fn project_hash(path: &Path) -> String {
    let canonical = canonical_path(path);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(SHORT_HASH_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Current git branch for a directory, or `unknown`.
pub fn git_branch(dir: &Path) -> String {
    run_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_else(|| "unknown".to_string())
}

/// Branch plus last commit hash and author time.
pub fn git_info(dir: &Path) -> GitInfo {
    let mut info = GitInfo {
        branch: git_branch(dir),
        ..GitInfo::default()
    };
    if let Some(out) = run_git(dir, &["log", "-1", "--format=%H %aI"]) {
        let mut parts = out.splitn(2, ' ');
        if let Some(hash) = parts.next() {
            info.last_commit_hash = hash.to_string();
        }
        if let Some(time) = parts.next() {
            info.last_commit_time = time.to_string();
        }
    }
    info
}

/// Identify a project from its working directory (typically the hook
/// payload's `cwd`).
pub fn identify_project(cwd: &Path) -> ProjectIdentity {
    let path = canonical_path(cwd);
    let git_info = git_info(&path);
    ProjectIdentity {
        hash: project_hash(&path),
        git_branch: git_info.branch.clone(),
        git_info,
        path,
    }
}

/// Run a git command with a hard deadline. Returns trimmed stdout on
/// success; `None` on any failure, non-zero exit, empty output, or timeout
/// (the child is killed).
fn run_git(dir: &Path, args: &[&str]) -> Option<String> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + Duration::from_secs(GIT_TIMEOUT_SECS);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    return None;
                }
                let mut out = String::new();
                child.stdout.take()?.read_to_string(&mut out).ok()?;
                let trimmed = out.trim();
                if trimmed.is_empty() {
                    return None;
                }
                return Some(trimmed.to_string());
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_16_hex() {
        let dir = tempfile::tempdir().unwrap();
        let h1 = project_hash(dir.path());
        let h2 = project_hash(dir.path());
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_paths_hash_differently() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_ne!(project_hash(a.path()), project_hash(b.path()));
    }

    #[test]
    fn non_git_directory_degrades_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(git_branch(dir.path()), "unknown");
        let info = git_info(dir.path());
        assert_eq!(info.branch, "unknown");
        assert!(info.last_commit_hash.is_empty());
    }

    #[test]
    fn identify_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let id = identify_project(dir.path());
        assert_eq!(id.hash.len(), 16);
        assert_eq!(id.git_branch, "unknown");
        assert!(id.path.is_absolute());
    }
}
