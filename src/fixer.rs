use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::{Agent, ConfigStore, SkipReason};
use crate::cost::CostLedger;
use crate::error::{Error, Result};
use crate::git;
use crate::llm::{GenerationRequest, Generator};
use crate::oracle::{OracleVerdict, TestOracle};
use crate::store::IssueStore;
use crate::templates::TemplateEngine;

/// Result of one bug-fix invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Skipped {
        reason: SkipReason,
    },
    Fixed {
        attempts: u32,
        cost: f64,
        monthly_total: f64,
    },
    Exhausted {
        attempts: u32,
        error: String,
    },
}

impl FixOutcome {
    pub fn success(&self) -> bool {
        matches!(self, FixOutcome::Fixed { .. })
    }
}

/// A generated candidate fix with the cost of producing it.
struct Candidate {
    code: String,
    cost: f64,
    monthly_total: f64,
}

/// Bounded-attempt bug-fix workflow: generate a candidate, apply it, validate
/// against the test oracle, and commit or roll back.
///
/// Attempts are strictly sequential. The file under fix is exclusively owned
/// by the running invocation; after any unsuccessful invocation its content
/// is byte-identical to the pre-invocation snapshot.
pub struct BugFixer<'a, G, O, S> {
    config: &'a ConfigStore,
    templates: &'a TemplateEngine,
    generator: &'a G,
    oracle: &'a O,
    ledger: &'a CostLedger<S>,
    repo_root: PathBuf,
}

impl<'a, G, O, S> BugFixer<'a, G, O, S>
where
    G: Generator,
    O: TestOracle,
    S: IssueStore,
{
    pub fn new(
        config: &'a ConfigStore,
        templates: &'a TemplateEngine,
        generator: &'a G,
        oracle: &'a O,
        ledger: &'a CostLedger<S>,
        repo_root: PathBuf,
    ) -> Self {
        Self {
            config,
            templates,
            generator,
            oracle,
            ledger,
            repo_root,
        }
    }

    pub async fn fix_file(&self, filename: &str, error_message: &str) -> Result<FixOutcome> {
        if let Some(reason) = self.config.entry_guard(Agent::BugFixer, filename) {
            info!(filename, %reason, "skipping fix");
            return Ok(FixOutcome::Skipped { reason });
        }

        info!(filename, "fixing bug");

        // Snapshot once; every rollback restores exactly this content.
        let original = std::fs::read_to_string(filename)?;
        let max_attempts = self.config.fixer().max_attempts_per_file;

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "fix attempt");

            let candidate = match self.generate_candidate(filename, error_message, &original) {
                Ok(candidate) => candidate,
                Err(Error::Generation(e)) => {
                    // A failed generation consumes the attempt but not an
                    // apply+validate cycle; the file is untouched.
                    warn!(attempt, error = %e, "generation failed");
                    continue;
                }
                Err(e) => return Err(e),
            };

            std::fs::write(filename, &candidate.code)?;
            info!(attempt, "applied candidate fix, running tests");

            match self.oracle.run().await {
                Ok(OracleVerdict::Passed) => {
                    info!(attempt, "tests passed, fix is working");
                    if self.config.fixer().auto_commit {
                        self.commit_fix(filename, error_message);
                    }
                    return Ok(FixOutcome::Fixed {
                        attempts: attempt,
                        cost: candidate.cost,
                        monthly_total: candidate.monthly_total,
                    });
                }
                Ok(OracleVerdict::Failed { .. }) => {
                    std::fs::write(filename, &original)?;
                    info!(attempt, "tests failed, rolled back to original code");
                }
                Err(e) => {
                    std::fs::write(filename, &original)?;
                    warn!(attempt, error = %e, "test oracle unavailable, rolled back");
                }
            }
        }

        Ok(FixOutcome::Exhausted {
            attempts: max_attempts,
            error: "All fix attempts failed".to_string(),
        })
    }

    /// One generation call plus cost tracking.
    ///
    /// `UnknownModel` propagates; issue-store trouble must never block the
    /// fix, so the cost falls back to zero with a warning.
    fn generate_candidate(
        &self,
        filename: &str,
        error_message: &str,
        code: &str,
    ) -> Result<Candidate> {
        let settings = self.config.fixer();
        let error_context = if error_message.is_empty() {
            "Analyze code for potential issues"
        } else {
            error_message
        };

        let prompt_settings = self.config.prompt_settings(Agent::BugFixer);
        let mut vars: HashMap<String, Value> = prompt_settings
            .custom_variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.insert("code".to_string(), Value::String(code.to_string()));
        vars.insert(
            "errorMessage".to_string(),
            Value::String(error_context.to_string()),
        );
        vars.insert("filename".to_string(), Value::String(filename.to_string()));
        vars.insert(
            "safetyLevel".to_string(),
            Value::String(settings.safety_level.clone()),
        );

        let prompt = self.templates.render(
            Agent::BugFixer.config_key(),
            &prompt_settings.template,
            &vars,
        )?;

        let model = self.config.resolved_model(Agent::BugFixer);
        let generation = self.generator.generate(&GenerationRequest {
            model: model.to_string(),
            prompt,
            max_tokens: self.config.resolved_max_tokens(Agent::BugFixer),
        })?;

        let (cost, monthly_total) = match self.ledger.record_and_total(
            Agent::BugFixer,
            model,
            generation.prompt_tokens,
            generation.completion_tokens,
        ) {
            Ok(report) => {
                info!(
                    cost = report.cost,
                    monthly_total = report.monthly_total,
                    "tracked fix cost"
                );
                (report.cost, report.monthly_total)
            }
            Err(e @ Error::UnknownModel(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "cost tracking unavailable");
                (0.0, 0.0)
            }
        };

        Ok(Candidate {
            code: generation.text.trim().to_string(),
            cost,
            monthly_total,
        })
    }

    /// Commit the accepted fix. Failures are logged, never escalated — the
    /// fix itself already succeeded.
    fn commit_fix(&self, filename: &str, error_message: &str) {
        let message = if error_message.is_empty() {
            format!("Auto-fix: Resolve issue in {filename}")
        } else {
            format!("Auto-fix: {error_message}")
        };

        let result =
            git::stage_all(&self.repo_root).and_then(|_| git::commit(&self.repo_root, &message));
        match result {
            Ok(()) => info!(filename, "fix committed automatically"),
            Err(e) => warn!(error = %e, "failed to commit fix automatically"),
        }
    }
}
