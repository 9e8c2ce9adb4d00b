use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Run a git subcommand in `dir`, returning stdout on success.
pub fn git_in_dir(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Git(format!("failed to run git: {e}")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )))
    }
}

pub fn stage_all(dir: &Path) -> Result<()> {
    git_in_dir(dir, &["add", "."]).map(|_| ())
}

pub fn stage(dir: &Path, paths: &[&str]) -> Result<()> {
    let mut args = vec!["add", "--"];
    args.extend_from_slice(paths);
    git_in_dir(dir, &args).map(|_| ())
}

pub fn commit(dir: &Path, message: &str) -> Result<()> {
    git_in_dir(dir, &["commit", "-m", message]).map(|_| ())
}

pub fn push(dir: &Path) -> Result<()> {
    git_in_dir(dir, &["push"]).map(|_| ())
}

/// True when the index differs from HEAD.
pub fn has_staged_changes(dir: &Path) -> Result<bool> {
    let status = Command::new("git")
        .args(["diff", "--staged", "--quiet"])
        .current_dir(dir)
        .status()
        .map_err(|e| Error::Git(format!("failed to run git: {e}")))?;
    // `diff --quiet` exits 1 when there are differences
    Ok(!status.success())
}

/// Files changed in the last commit.
pub fn changed_files(dir: &Path) -> Result<Vec<String>> {
    let output = git_in_dir(dir, &["diff", "--name-only", "HEAD~1", "HEAD"])?;
    let files: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    debug!(count = files.len(), "changed files in last commit");
    Ok(files)
}
