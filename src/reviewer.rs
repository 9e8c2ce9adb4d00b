use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::{Agent, ConfigStore, SkipReason};
use crate::cost::CostLedger;
use crate::error::{Error, Result};
use crate::llm::{GenerationRequest, Generator};
use crate::store::IssueStore;
use crate::templates::TemplateEngine;

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Skipped { reason: SkipReason },
    Reviewed(Review),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub filename: String,
    pub analysis: String,
    pub cost: f64,
    pub monthly_total: f64,
}

fn detect_language(filename: &str) -> &'static str {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some("js") | Some("jsx") => "javascript",
        Some("ts") | Some("tsx") => "typescript",
        Some("py") => "python",
        Some("go") => "go",
        Some("rs") => "rust",
        _ => "javascript",
    }
}

/// Template-driven code review with cost tracking and budget commentary.
pub struct CodeReviewer<'a, G, S> {
    config: &'a ConfigStore,
    templates: &'a TemplateEngine,
    generator: &'a G,
    ledger: &'a CostLedger<S>,
}

impl<'a, G, S> CodeReviewer<'a, G, S>
where
    G: Generator,
    S: IssueStore,
{
    pub fn new(
        config: &'a ConfigStore,
        templates: &'a TemplateEngine,
        generator: &'a G,
        ledger: &'a CostLedger<S>,
    ) -> Self {
        Self {
            config,
            templates,
            generator,
            ledger,
        }
    }

    pub fn review_file(&self, filename: &str) -> Result<ReviewOutcome> {
        if let Some(reason) = self.config.entry_guard(Agent::CodeReviewer, filename) {
            info!(filename, %reason, "skipping review");
            return Ok(ReviewOutcome::Skipped { reason });
        }

        info!(filename, "reviewing");
        let code = std::fs::read_to_string(filename)?;
        let settings = self.config.reviewer();

        let standards = serde_json::to_string_pretty(&settings.team_standards)
            .map_err(|e| Error::Template(format!("failed to render team standards: {e}")))?;

        let prompt_settings = self.config.prompt_settings(Agent::CodeReviewer);
        let mut vars: HashMap<String, Value> = prompt_settings
            .custom_variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.insert("code".to_string(), Value::String(code));
        vars.insert("filename".to_string(), Value::String(filename.to_string()));
        vars.insert(
            "language".to_string(),
            Value::String(detect_language(filename).to_string()),
        );
        vars.insert(
            "focusAreas".to_string(),
            Value::Array(
                settings
                    .focus_areas
                    .iter()
                    .map(|a| Value::String(a.clone()))
                    .collect(),
            ),
        );
        vars.insert(
            "severity".to_string(),
            Value::String(settings.severity.clone()),
        );
        vars.insert("teamStandards".to_string(), Value::String(standards));

        let prompt = self.templates.render(
            Agent::CodeReviewer.config_key(),
            &prompt_settings.template,
            &vars,
        )?;

        let model = self.config.resolved_model(Agent::CodeReviewer);
        let generation = self.generator.generate(&GenerationRequest {
            model: model.to_string(),
            prompt,
            max_tokens: self.config.resolved_max_tokens(Agent::CodeReviewer),
        })?;

        let (cost, monthly_total) = match self.ledger.record_and_total(
            Agent::CodeReviewer,
            model,
            generation.prompt_tokens,
            generation.completion_tokens,
        ) {
            Ok(report) => {
                info!(
                    cost = report.cost,
                    monthly_total = report.monthly_total,
                    "tracked review cost"
                );
                self.ledger.maybe_warn_budget(report.monthly_total);
                (report.cost, report.monthly_total)
            }
            Err(e @ Error::UnknownModel(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "cost tracking unavailable");
                (0.0, 0.0)
            }
        };

        Ok(ReviewOutcome::Reviewed(Review {
            filename: filename.to_string(),
            analysis: generation.text,
            cost,
            monthly_total,
        }))
    }
}
