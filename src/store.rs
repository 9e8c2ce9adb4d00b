use std::process::Command;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// An issue as returned by the tracker, reduced to the fields we use.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// The issue tracker as ersatz key-value storage: list by label, create,
/// overwrite a body, and leave a comment.
pub trait IssueStore {
    fn list_by_label(&self, label: &str) -> Result<Vec<Issue>>;
    fn create(&self, title: &str, body: &str, label: &str) -> Result<u64>;
    fn update_body(&self, number: u64, body: &str) -> Result<()>;
    fn comment(&self, number: u64, body: &str) -> Result<()>;
}

/// Abstraction over `gh` CLI execution for testability.
pub trait GhClient {
    fn run(&self, args: &[&str]) -> Result<String>;
}

/// Real `gh` CLI client with retry and exponential backoff.
struct DefaultGhClient;

impl GhClient for DefaultGhClient {
    fn run(&self, args: &[&str]) -> Result<String> {
        retry_with_backoff(|| {
            let output = Command::new("gh")
                .args(args)
                .output()
                .map_err(|e| Error::IssueStore(format!("failed to run gh: {e}")))?;

            if output.status.success() {
                String::from_utf8(output.stdout)
                    .map_err(|e| Error::IssueStore(format!("invalid utf8 from gh: {e}")))
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::IssueStore(format!("gh failed: {stderr}")))
            }
        })
    }
}

fn retry_with_backoff<F, T>(f: F) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    for attempt in 1..=MAX_RETRIES {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if attempt < MAX_RETRIES => {
                warn!(attempt, error = %e, backoff_ms, "retrying gh after error");
                thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!()
}

/// GitHub-issue-backed store via the `gh` CLI.
pub struct GhIssueStore {
    client: Box<dyn GhClient>,
}

impl Default for GhIssueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GhIssueStore {
    pub fn new() -> Self {
        Self {
            client: Box::new(DefaultGhClient),
        }
    }

    #[cfg(test)]
    fn with_client(client: Box<dyn GhClient>) -> Self {
        Self { client }
    }
}

impl IssueStore for GhIssueStore {
    fn list_by_label(&self, label: &str) -> Result<Vec<Issue>> {
        let json = self.client.run(&[
            "issue",
            "list",
            "--label",
            label,
            "--state",
            "open",
            "--json",
            "number,title,body",
        ])?;
        let issues: Vec<Issue> = serde_json::from_str(&json)
            .map_err(|e| Error::IssueStore(format!("failed to parse issue list: {e}")))?;
        debug!(label, count = issues.len(), "listed issues");
        Ok(issues)
    }

    fn create(&self, title: &str, body: &str, label: &str) -> Result<u64> {
        let url = self.client.run(&[
            "issue", "create", "--title", title, "--body", body, "--label", label,
        ])?;

        // `gh issue create` prints the new issue URL; the number is its tail.
        let number = url
            .trim()
            .rsplit('/')
            .next()
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::IssueStore(format!("unexpected gh issue create output: {}", url.trim()))
            })?;
        debug!(number, title, "created issue");
        Ok(number)
    }

    fn update_body(&self, number: u64, body: &str) -> Result<()> {
        let number = number.to_string();
        self.client
            .run(&["issue", "edit", &number, "--body", body])?;
        Ok(())
    }

    fn comment(&self, number: u64, body: &str) -> Result<()> {
        let number = number.to_string();
        self.client
            .run(&["issue", "comment", &number, "--body", body])?;
        Ok(())
    }
}
