use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::{Error, Result};
use crate::process::{ProcessConfig, spawn_and_stream};

/// Outcome of one test-suite run.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleVerdict {
    Passed,
    Failed { output: String },
}

impl OracleVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, OracleVerdict::Passed)
    }
}

/// The pass/fail oracle that validates a candidate fix.
pub trait TestOracle {
    fn run(&self) -> impl std::future::Future<Output = Result<OracleVerdict>> + Send;
}

/// Oracle that runs the configured test command (e.g. `npm test`).
pub struct CommandOracle {
    command: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl CommandOracle {
    pub fn new(command: String, working_dir: PathBuf) -> Self {
        Self {
            command,
            working_dir,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl TestOracle for CommandOracle {
    async fn run(&self) -> Result<OracleVerdict> {
        let mut parts = self.command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| Error::Oracle("empty test command".to_string()))?;

        info!(command = %self.command, "running test suite");
        let config = ProcessConfig {
            command: program,
            args: parts.collect(),
            working_dir: self.working_dir.clone(),
            timeout: self.timeout,
            log_prefix: "tests".to_string(),
        };

        let output = spawn_and_stream(config)
            .await
            .map_err(|e| Error::Oracle(e.to_string()))?;

        if output.success() {
            Ok(OracleVerdict::Passed)
        } else {
            Ok(OracleVerdict::Failed {
                output: output.combined(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle(command: &str) -> CommandOracle {
        CommandOracle::new(command.to_string(), std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_passing_command() {
        let verdict = oracle("true").run().await.unwrap();
        assert!(verdict.passed());
    }

    #[tokio::test]
    async fn test_failing_command_captures_output() {
        let verdict = oracle("sh -c echo-and-fail").run().await.unwrap();
        // unknown sh subcommand exits non-zero with diagnostics on stderr
        match verdict {
            OracleVerdict::Failed { output } => assert!(!output.is_empty()),
            OracleVerdict::Passed => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        let err = oracle("").run().await.unwrap_err();
        assert!(err.to_string().contains("empty test command"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let err = oracle("mend-no-such-test-runner").run().await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
