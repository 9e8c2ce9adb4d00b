use std::path::Path;

use regex::Regex;
use tracing::{info, warn};

use crate::docwriter::{DocOutcome, DocumentationWriter};
use crate::error::{Error, Result};
use crate::fixer::{BugFixer, FixOutcome};
use crate::git;
use crate::llm::Generator;
use crate::oracle::{OracleVerdict, TestOracle};
use crate::store::IssueStore;

const API_PATH_MARKERS: &[&str] = &["api/", "server/api/", "routes/", "endpoints/"];
const API_SCAN_DIRS: &[&str] = &["api", "server/api", "routes", "endpoints"];

/// A failing source file and the error context to hand to the fix workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFailure {
    pub file: String,
    pub error: String,
}

/// Pull the first non-test source file out of stack-trace style test output.
pub fn parse_test_output(output: &str) -> Option<TestFailure> {
    let re = Regex::new(r"at \w+.*\(([^)]+\.[cm]?[jt]s):\d+:\d+\)").expect("static regex compiles");
    for caps in re.captures_iter(output) {
        let file = caps[1].to_string();
        if file.contains(".test.") || file.contains(".spec.") || file.contains("node_modules") {
            continue;
        }
        let file = if file.starts_with("./") || file.starts_with('/') {
            file
        } else {
            format!("./{file}")
        };
        return Some(TestFailure {
            file,
            error: format!("Test failures:\n\n{output}"),
        });
    }
    None
}

/// CI fix mode: run the suite, and when it fails, drive the fix workflow
/// against the file implicated by the output, then push the committed fix.
pub async fn run_ci_fix<G, O, S>(
    fixer: &BugFixer<'_, G, O, S>,
    oracle: &O,
    repo_root: &Path,
) -> Result<()>
where
    G: Generator,
    O: TestOracle,
    S: IssueStore,
{
    info!("checking for test failures");
    match oracle.run().await? {
        OracleVerdict::Passed => {
            info!("all tests passing, no fixes needed");
            Ok(())
        }
        OracleVerdict::Failed { output } => {
            let failure = parse_test_output(&output).ok_or_else(|| {
                Error::Oracle("could not locate a source file in the failing test output".to_string())
            })?;

            info!(file = %failure.file, "attempting automated fix");
            match fixer.fix_file(&failure.file, &failure.error).await? {
                FixOutcome::Fixed { attempts, .. } => {
                    info!(file = %failure.file, attempts, "fix succeeded");
                    if let Err(e) = git::push(repo_root) {
                        warn!(error = %e, "failed to push fix");
                    }
                    Ok(())
                }
                FixOutcome::Skipped { reason } => {
                    info!(file = %failure.file, %reason, "fix skipped");
                    Ok(())
                }
                FixOutcome::Exhausted { attempts, error } => {
                    warn!(file = %failure.file, attempts, error, "could not fix");
                    Ok(())
                }
            }
        }
    }
}

fn is_api_file(filename: &str) -> bool {
    API_PATH_MARKERS.iter().any(|m| filename.contains(m))
        && (filename.ends_with(".js") || filename.ends_with(".ts"))
}

fn collect_source_files(root: &Path, rel: &Path, files: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(root.join(rel)) else {
        return;
    };
    for entry in entries.flatten() {
        let rel_child = rel.join(entry.file_name());
        if entry.path().is_dir() {
            collect_source_files(root, &rel_child, files);
        } else if let Some(name) = rel_child.to_str()
            && (name.ends_with(".js") || name.ends_with(".ts"))
        {
            files.push(name.to_string());
        }
    }
}

fn scan_api_dirs(repo_root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    for dir in API_SCAN_DIRS {
        collect_source_files(repo_root, Path::new(dir), &mut files);
    }
    files.sort();
    files
}

/// API files touched by the last commit; falls back to scanning the known
/// API directories when the diff is unavailable.
pub fn changed_api_files(repo_root: &Path) -> Vec<String> {
    let changed = match git::changed_files(repo_root) {
        Ok(files) => files,
        Err(e) => {
            info!(error = %e, "git diff unavailable, scanning API directories");
            return scan_api_dirs(repo_root);
        }
    };
    changed
        .into_iter()
        .filter(|f| is_api_file(f))
        .filter(|f| repo_root.join(f).exists())
        .collect()
}

fn render_doc_summary(files: &[String]) -> String {
    let mut body = String::from("**API documentation updated**\n\nRegenerated docs for:\n");
    for file in files {
        body.push_str(&format!("- `{file}`\n"));
    }
    body
}

fn commit_doc_changes(repo_root: &Path, files: &[String]) {
    let result = (|| -> Result<()> {
        git::stage(repo_root, &["docs", "README.md"])?;
        if !git::has_staged_changes(repo_root)? {
            info!("no documentation changes to commit");
            return Ok(());
        }
        let names: Vec<&str> = files
            .iter()
            .map(|f| {
                Path::new(f)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(f)
            })
            .collect();
        git::commit(
            repo_root,
            &format!("Auto-update docs for: {}", names.join(", ")),
        )?;
        git::push(repo_root)?;
        info!("documentation committed and pushed");
        Ok(())
    })();

    if let Err(e) = result {
        warn!(error = %e, "failed to commit documentation changes");
    }
}

/// CI docs mode: document API files changed by the last commit, commit the
/// results, and summarize on the PR when one is in context.
pub fn run_ci_docs<G, S>(
    writer: &DocumentationWriter<'_, G, S>,
    store: &impl IssueStore,
    pr_number: Option<u64>,
    repo_root: &Path,
) -> Result<()>
where
    G: Generator,
    S: IssueStore,
{
    info!("checking for API changes");
    let files = changed_api_files(repo_root);
    if files.is_empty() {
        info!("no API files to document");
        return Ok(());
    }
    info!(count = files.len(), "documenting changed API files");

    let mut written = Vec::new();
    for file in &files {
        match writer.generate_docs(file)? {
            DocOutcome::Written { doc_path } => {
                info!(file, doc = %doc_path.display(), "documented");
                written.push(file.clone());
            }
            DocOutcome::Skipped { reason } => info!(file, %reason, "skipped"),
        }
    }
    if written.is_empty() {
        return Ok(());
    }

    commit_doc_changes(repo_root, &written);

    if let Some(pr) = pr_number {
        if let Err(e) = store.comment(pr, &render_doc_summary(&written)) {
            warn!(pr, error = %e, "failed to post documentation comment");
        }
    }

    Ok(())
}
