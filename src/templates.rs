use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};

const DEFAULT_REVIEWER: &str = include_str!("default_prompts/code-reviewer.md");
const DEFAULT_FIXER: &str = include_str!("default_prompts/bug-fixer.md");
const DEFAULT_DOC_WRITER: &str = include_str!("default_prompts/documentation-writer.md");

/// Convert a hyphen-separated directory name to its camel-joined config key
/// (`code-reviewer` → `codeReviewer`).
pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Replace every `{key}` occurrence with the variable's string form.
/// Placeholders with no matching variable stay verbatim.
pub fn substitute(template: &str, vars: &HashMap<String, Value>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), &stringify(value));
    }
    result
}

/// Named prompt templates per agent, loaded from a directory tree with a
/// built-in fallback set.
pub struct TemplateEngine {
    templates: HashMap<String, HashMap<String, String>>,
}

impl TemplateEngine {
    /// Scan `root_dir` for one subdirectory per agent; every `.md` file
    /// inside becomes a template keyed by its stem. Any scan failure falls
    /// back to the built-in defaults.
    pub fn load(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref();
        match Self::scan(root) {
            Ok(templates) if !templates.is_empty() => {
                let mut agents: Vec<&String> = templates.keys().collect();
                agents.sort();
                info!(?agents, "loaded prompt templates from {}", root.display());
                Self { templates }
            }
            Ok(_) => {
                warn!(
                    "no prompt templates under {}, using built-in defaults",
                    root.display()
                );
                Self::defaults()
            }
            Err(e) => {
                warn!(
                    "could not load prompt templates from {}: {e}, using built-in defaults",
                    root.display()
                );
                Self::defaults()
            }
        }
    }

    /// The built-in template set covering the three known agents.
    pub fn defaults() -> Self {
        let mut templates = HashMap::new();
        for (agent, body) in [
            ("codeReviewer", DEFAULT_REVIEWER),
            ("bugFixer", DEFAULT_FIXER),
            ("documentationWriter", DEFAULT_DOC_WRITER),
        ] {
            let mut set = HashMap::new();
            set.insert("default".to_string(), body.to_string());
            templates.insert(agent.to_string(), set);
        }
        Self { templates }
    }

    fn scan(root: &Path) -> std::io::Result<HashMap<String, HashMap<String, String>>> {
        let mut templates = HashMap::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let agent = camelize(&entry.file_name().to_string_lossy());

            let mut set = HashMap::new();
            for file in std::fs::read_dir(entry.path())? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                set.insert(stem.to_string(), std::fs::read_to_string(&path)?);
            }
            if !set.is_empty() {
                templates.insert(agent, set);
            }
        }
        Ok(templates)
    }

    /// Render a named template for an agent, substituting `vars`.
    ///
    /// Falls back to the agent's `default` template when `template_name`
    /// does not exist.
    pub fn render(
        &self,
        agent: &str,
        template_name: &str,
        vars: &HashMap<String, Value>,
    ) -> Result<String> {
        let set = self
            .templates
            .get(agent)
            .ok_or_else(|| Error::UnknownAgent(agent.to_string()))?;
        let template = set
            .get(template_name)
            .or_else(|| set.get("default"))
            .ok_or_else(|| Error::MissingDefault(agent.to_string()))?;
        Ok(substitute(template, vars))
    }

    /// Template names available for an agent, sorted.
    pub fn list(&self, agent: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .templates
            .get(agent)
            .map(|set| set.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Agents that have at least one template, sorted.
    pub fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.templates.keys().cloned().collect();
        agents.sort();
        agents
    }
}
