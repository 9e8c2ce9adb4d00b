use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::config::{Agent, ConfigStore, SkipReason};
use crate::cost::CostLedger;
use crate::error::{Error, Result};
use crate::llm::{GenerationRequest, Generator};
use crate::store::IssueStore;
use crate::templates::TemplateEngine;

/// How much of an existing doc file is quoted back into the prompt.
const EXISTING_DOCS_CONTEXT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum DocOutcome {
    Skipped { reason: SkipReason },
    Written { doc_path: PathBuf },
}

/// Writes per-file documentation under `docs/` and keeps the README index
/// current.
pub struct DocumentationWriter<'a, G, S> {
    config: &'a ConfigStore,
    templates: &'a TemplateEngine,
    generator: &'a G,
    ledger: &'a CostLedger<S>,
    root: PathBuf,
}

impl<'a, G, S> DocumentationWriter<'a, G, S>
where
    G: Generator,
    S: IssueStore,
{
    pub fn new(
        config: &'a ConfigStore,
        templates: &'a TemplateEngine,
        generator: &'a G,
        ledger: &'a CostLedger<S>,
        root: PathBuf,
    ) -> Self {
        Self {
            config,
            templates,
            generator,
            ledger,
            root,
        }
    }

    /// Generate documentation for `filename` (relative to the project root).
    pub fn generate_docs(&self, filename: &str) -> Result<DocOutcome> {
        if let Some(reason) = self.config.entry_guard(Agent::DocumentationWriter, filename) {
            info!(filename, %reason, "skipping documentation");
            return Ok(DocOutcome::Skipped { reason });
        }

        let settings = self.config.doc_writer();
        info!(filename, style = %settings.style, "generating docs");

        let code = std::fs::read_to_string(self.root.join(filename))?;
        let doc_path = self.doc_file_path(filename);
        let existing = std::fs::read_to_string(&doc_path).ok();
        let existing_context = existing
            .as_deref()
            .map(|docs| {
                let head: String = docs.chars().take(EXISTING_DOCS_CONTEXT_CHARS).collect();
                format!("\n**Existing documentation:**\n{head}...")
            })
            .unwrap_or_default();

        let prompt_settings = self.config.prompt_settings(Agent::DocumentationWriter);
        let mut vars: HashMap<String, Value> = prompt_settings
            .custom_variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.insert("code".to_string(), Value::String(code));
        vars.insert("filename".to_string(), Value::String(filename.to_string()));
        vars.insert("style".to_string(), Value::String(settings.style.clone()));
        vars.insert(
            "voiceAndTone".to_string(),
            Value::String(settings.voice_and_tone.clone()),
        );
        vars.insert(
            "includeExamples".to_string(),
            Value::String(if settings.include_examples { "Yes" } else { "No" }.to_string()),
        );
        vars.insert(
            "existingContext".to_string(),
            Value::String(existing_context),
        );

        let prompt = self.templates.render(
            Agent::DocumentationWriter.config_key(),
            &prompt_settings.template,
            &vars,
        )?;

        let model = self.config.resolved_model(Agent::DocumentationWriter);
        let generation = self.generator.generate(&GenerationRequest {
            model: model.to_string(),
            prompt,
            max_tokens: self.config.resolved_max_tokens(Agent::DocumentationWriter),
        })?;

        match self.ledger.record_and_total(
            Agent::DocumentationWriter,
            model,
            generation.prompt_tokens,
            generation.completion_tokens,
        ) {
            Ok(report) => self.ledger.maybe_warn_budget(report.monthly_total),
            Err(e @ Error::UnknownModel(_)) => return Err(e),
            Err(e) => warn!(error = %e, "cost tracking unavailable"),
        }

        if let Some(parent) = doc_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&doc_path, generation.text.trim())?;
        info!(doc = %doc_path.display(), "wrote documentation");

        if settings.generate_readme {
            self.update_readme_index(filename)?;
        }

        Ok(DocOutcome::Written { doc_path })
    }

    fn doc_file_path(&self, filename: &str) -> PathBuf {
        self.root
            .join("docs")
            .join(Path::new(filename).with_extension("md"))
    }

    /// Keep a `## Documentation` link list in the README, one entry per
    /// documented file.
    fn update_readme_index(&self, filename: &str) -> Result<()> {
        let readme_path = self.root.join("README.md");
        let mut readme = std::fs::read_to_string(&readme_path)
            .unwrap_or_else(|_| "# Project Documentation\n\n".to_string());

        let doc_rel = Path::new("docs").join(Path::new(filename).with_extension("md"));
        let link = format!("- [{filename}]({})", doc_rel.display());

        if !readme.contains("## Documentation") {
            readme.push_str("\n## Documentation\n\n");
        }
        if !readme.contains(&link) {
            readme.push_str(&link);
            readme.push('\n');
        }

        std::fs::write(&readme_path, readme)?;
        info!("updated README.md index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;
    use crate::llm::Generation;
    use crate::test_helpers::{MemoryIssueStore, MockGenerator};
    use tempfile::TempDir;

    fn generation(text: &str) -> Generation {
        Generation {
            text: text.to_string(),
            prompt_tokens: 300,
            completion_tokens: 120,
        }
    }

    fn setup(dir: &TempDir, filename: &str, code: &str) {
        let path = dir.path().join(filename);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, code).unwrap();
    }

    #[test]
    fn test_disabled_skips() {
        let dir = TempDir::new().unwrap();
        setup(&dir, "api/users.js", "code");
        let mut doc = ConfigDocument::default();
        doc.documentation_writer.enabled = false;
        let config = ConfigStore::from_document(doc);
        let templates = TemplateEngine::defaults();
        let generator = MockGenerator::new(vec![]);
        let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
        let writer = DocumentationWriter::new(
            &config,
            &templates,
            &generator,
            &ledger,
            dir.path().to_path_buf(),
        );

        let outcome = writer.generate_docs("api/users.js").unwrap();
        assert_eq!(
            outcome,
            DocOutcome::Skipped {
                reason: SkipReason::Disabled
            }
        );
    }

    #[test]
    fn test_writes_doc_file_and_readme() {
        let dir = TempDir::new().unwrap();
        setup(&dir, "api/users.js", "export function list() {}");
        let config = ConfigStore::from_document(ConfigDocument::default());
        let templates = TemplateEngine::defaults();
        let generator = MockGenerator::new(vec![Ok(generation("# users API\n\nLists users.\n"))]);
        let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
        let writer = DocumentationWriter::new(
            &config,
            &templates,
            &generator,
            &ledger,
            dir.path().to_path_buf(),
        );

        let outcome = writer.generate_docs("api/users.js").unwrap();
        let doc_path = dir.path().join("docs/api/users.md");
        assert_eq!(
            outcome,
            DocOutcome::Written {
                doc_path: doc_path.clone()
            }
        );
        assert_eq!(
            std::fs::read_to_string(&doc_path).unwrap(),
            "# users API\n\nLists users."
        );

        let readme = std::fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert!(readme.contains("## Documentation"));
        assert!(readme.contains("- [api/users.js](docs/api/users.md)"));
    }

    #[test]
    fn test_readme_link_not_duplicated() {
        let dir = TempDir::new().unwrap();
        setup(&dir, "api/users.js", "code");
        let config = ConfigStore::from_document(ConfigDocument::default());
        let templates = TemplateEngine::defaults();
        let generator = MockGenerator::new(vec![
            Ok(generation("docs v1")),
            Ok(generation("docs v2")),
        ]);
        let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
        let writer = DocumentationWriter::new(
            &config,
            &templates,
            &generator,
            &ledger,
            dir.path().to_path_buf(),
        );

        writer.generate_docs("api/users.js").unwrap();
        writer.generate_docs("api/users.js").unwrap();

        let readme = std::fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert_eq!(readme.matches("- [api/users.js]").count(), 1);
    }

    #[test]
    fn test_existing_docs_quoted_into_prompt() {
        let dir = TempDir::new().unwrap();
        setup(&dir, "api/users.js", "code");
        setup(&dir, "docs/api/users.md", "Old documentation body");
        let config = ConfigStore::from_document(ConfigDocument::default());
        let templates = TemplateEngine::defaults();
        let generator = MockGenerator::new(vec![Ok(generation("new docs"))]);
        let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
        let writer = DocumentationWriter::new(
            &config,
            &templates,
            &generator,
            &ledger,
            dir.path().to_path_buf(),
        );

        writer.generate_docs("api/users.js").unwrap();
        let prompt = generator.last_prompt().unwrap();
        assert!(prompt.contains("Existing documentation"));
        assert!(prompt.contains("Old documentation body"));
    }

    #[test]
    fn test_style_knobs_reach_prompt() {
        let dir = TempDir::new().unwrap();
        setup(&dir, "api/users.js", "code");
        let mut doc = ConfigDocument::default();
        doc.documentation_writer.style = "brief".to_string();
        doc.documentation_writer.voice_and_tone = "casual".to_string();
        doc.documentation_writer.include_examples = false;
        let config = ConfigStore::from_document(doc);
        let templates = TemplateEngine::defaults();
        let generator = MockGenerator::new(vec![Ok(generation("docs"))]);
        let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
        let writer = DocumentationWriter::new(
            &config,
            &templates,
            &generator,
            &ledger,
            dir.path().to_path_buf(),
        );

        writer.generate_docs("api/users.js").unwrap();
        let prompt = generator.last_prompt().unwrap();
        assert!(prompt.contains("**Documentation Style:** brief"));
        assert!(prompt.contains("**Voice and Tone:** casual"));
        assert!(prompt.contains("**Include Examples:** No"));
    }

    #[test]
    fn test_readme_untouched_when_disabled() {
        let dir = TempDir::new().unwrap();
        setup(&dir, "api/users.js", "code");
        let mut doc = ConfigDocument::default();
        doc.documentation_writer.generate_readme = false;
        let config = ConfigStore::from_document(doc);
        let templates = TemplateEngine::defaults();
        let generator = MockGenerator::new(vec![Ok(generation("docs"))]);
        let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
        let writer = DocumentationWriter::new(
            &config,
            &templates,
            &generator,
            &ledger,
            dir.path().to_path_buf(),
        );

        writer.generate_docs("api/users.js").unwrap();
        assert!(!dir.path().join("README.md").exists());
    }
}
