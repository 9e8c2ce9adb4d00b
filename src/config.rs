use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = ".agent-config.json";

/// The three LLM-driven agents this tool knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agent {
    CodeReviewer,
    BugFixer,
    DocumentationWriter,
}

impl Agent {
    /// Key of this agent's section in the configuration document.
    pub fn config_key(self) -> &'static str {
        match self {
            Agent::CodeReviewer => "codeReviewer",
            Agent::BugFixer => "bugFixer",
            Agent::DocumentationWriter => "documentationWriter",
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Why an agent declined to process a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Excluded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("disabled"),
            SkipReason::Excluded => f.write_str("excluded"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    pub model: String,
    pub max_tokens: u32,
    pub enabled: bool,
    pub monthly_budget: f64,
    pub test_command: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            enabled: true,
            monthly_budget: 50.0,
            test_command: "npm test".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamStandards {
    pub max_function_length: u32,
    #[serde(rename = "requireJSDoc")]
    pub require_jsdoc: bool,
    pub enforce_camel_case: bool,
}

impl Default for TeamStandards {
    fn default() -> Self {
        Self {
            max_function_length: 50,
            require_jsdoc: false,
            enforce_camel_case: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerSettings {
    pub enabled: bool,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub focus_areas: Vec<String>,
    pub severity: String,
    pub exclude_patterns: Vec<String>,
    pub team_standards: TeamStandards,
}

impl Default for ReviewerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            max_tokens: None,
            focus_areas: vec![
                "bugs".to_string(),
                "security".to_string(),
                "performance".to_string(),
            ],
            severity: "medium".to_string(),
            exclude_patterns: vec![
                "*.test.js".to_string(),
                "*.spec.js".to_string(),
                "node_modules/**".to_string(),
            ],
            team_standards: TeamStandards::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixerSettings {
    pub enabled: bool,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub attempt_complex_fixes: bool,
    pub max_attempts_per_file: u32,
    pub exclude_patterns: Vec<String>,
    pub safety_level: String,
    pub auto_commit: bool,
}

impl Default for FixerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: Some("gpt-4o-mini".to_string()),
            max_tokens: Some(1500),
            attempt_complex_fixes: false,
            max_attempts_per_file: 3,
            exclude_patterns: vec![
                "**/migrations/**".to_string(),
                "**/seeds/**".to_string(),
                "**/fixtures/**".to_string(),
            ],
            safety_level: "medium".to_string(),
            auto_commit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocWriterSettings {
    pub enabled: bool,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub style: String,
    pub include_examples: bool,
    pub voice_and_tone: String,
    pub generate_readme: bool,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for DocWriterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: Some("gpt-4o".to_string()),
            max_tokens: Some(3000),
            style: "standard".to_string(),
            include_examples: true,
            voice_and_tone: "professional".to_string(),
            generate_readme: true,
            exclude_patterns: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptSettings {
    pub template: String,
    #[serde(default)]
    pub custom_variables: serde_json::Map<String, Value>,
}

impl PromptSettings {
    fn named(template: &str) -> Self {
        Self {
            template: template.to_string(),
            custom_variables: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptsSection {
    pub code_reviewer: PromptSettings,
    pub bug_fixer: PromptSettings,
    pub documentation_writer: PromptSettings,
}

impl Default for PromptsSection {
    fn default() -> Self {
        Self {
            code_reviewer: PromptSettings::named("default"),
            bug_fixer: PromptSettings::named("default"),
            documentation_writer: PromptSettings::named("comprehensive"),
        }
    }
}

/// The full configuration document as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    pub global: GlobalSettings,
    pub code_reviewer: ReviewerSettings,
    pub bug_fixer: FixerSettings,
    pub documentation_writer: DocWriterSettings,
    pub prompts: PromptsSection,
}

/// Deep-merge a user document over a defaults document.
///
/// Every key present in `user` overrides the corresponding default; keys
/// absent in `user` are filled from `defaults`. Recursion applies to nested
/// objects only — arrays and scalars (including `null`) replace wholesale.
pub fn merge_defaults(user: Value, defaults: Value) -> Value {
    match (user, defaults) {
        (Value::Object(mut user), Value::Object(defaults)) => {
            let mut merged = serde_json::Map::with_capacity(defaults.len());
            for (key, default_value) in defaults {
                match user.remove(&key) {
                    Some(user_value) => merged.insert(key, merge_defaults(user_value, default_value)),
                    None => merged.insert(key, default_value),
                };
            }
            // Keys only the user document has pass through untouched.
            for (key, value) in user {
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (user, _) => user,
    }
}

/// Compile one exclusion glob and test it against a filename.
///
/// `*` matches any run of characters (path separators included), `?` matches
/// exactly one character, everything else is literal. The compiled pattern is
/// unanchored, so containment anywhere in the filename counts as a match.
fn glob_match(pattern: &str, filename: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() + 8);
    for c in pattern.chars() {
        match c {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            c => translated.push_str(&regex::escape(&c.to_string())),
        }
    }
    match Regex::new(&translated) {
        Ok(re) => re.is_match(filename),
        Err(e) => {
            warn!(pattern, error = %e, "unusable exclude pattern, ignoring");
            false
        }
    }
}

/// Loads, defaults-merges, and persists the agent configuration document.
///
/// Loaded once at process start; read-only afterwards unless `save` is
/// called explicitly.
pub struct ConfigStore {
    doc: ConfigDocument,
    path: PathBuf,
}

impl ConfigStore {
    /// Load the document at `path`, merging it over the built-in defaults.
    ///
    /// Never fails: on any read or parse problem the defaults are used and
    /// written back to `path` so the next run starts from a real file.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::read_document(&path) {
            Ok(doc) => Self { doc, path },
            Err(reason) => {
                info!(
                    path = %path.display(),
                    reason,
                    "no usable config, creating default configuration"
                );
                let store = Self {
                    doc: ConfigDocument::default(),
                    path,
                };
                if let Err(e) = store.save() {
                    warn!(error = %e, "failed to persist default config");
                }
                store
            }
        }
    }

    fn read_document(path: &Path) -> std::result::Result<ConfigDocument, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let user: Value = serde_json::from_str(&content).map_err(|e| e.to_string())?;
        let defaults = serde_json::to_value(ConfigDocument::default())
            .expect("default config serializes");
        let merged = merge_defaults(user, defaults);
        serde_json::from_value(merged).map_err(|e| e.to_string())
    }

    /// Wrap an in-memory document; used by tests and embedders.
    pub fn from_document(doc: ConfigDocument) -> Self {
        Self {
            doc,
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Serialize the full document as pretty-printed JSON, overwriting the
    /// file it was loaded from.
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.doc)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&self.path, content)?;
        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn global(&self) -> &GlobalSettings {
        &self.doc.global
    }

    pub fn reviewer(&self) -> &ReviewerSettings {
        &self.doc.code_reviewer
    }

    pub fn fixer(&self) -> &FixerSettings {
        &self.doc.bug_fixer
    }

    pub fn doc_writer(&self) -> &DocWriterSettings {
        &self.doc.documentation_writer
    }

    pub fn prompt_settings(&self, agent: Agent) -> &PromptSettings {
        match agent {
            Agent::CodeReviewer => &self.doc.prompts.code_reviewer,
            Agent::BugFixer => &self.doc.prompts.bug_fixer,
            Agent::DocumentationWriter => &self.doc.prompts.documentation_writer,
        }
    }

    /// An agent runs only when it and the global switch are both enabled.
    pub fn is_enabled(&self, agent: Agent) -> bool {
        let agent_enabled = match agent {
            Agent::CodeReviewer => self.doc.code_reviewer.enabled,
            Agent::BugFixer => self.doc.bug_fixer.enabled,
            Agent::DocumentationWriter => self.doc.documentation_writer.enabled,
        };
        self.doc.global.enabled && agent_enabled
    }

    /// The entry guard every agent runs before touching a file.
    pub fn entry_guard(&self, agent: Agent, filename: &str) -> Option<SkipReason> {
        if !self.is_enabled(agent) {
            Some(SkipReason::Disabled)
        } else if self.should_skip(agent, filename) {
            Some(SkipReason::Excluded)
        } else {
            None
        }
    }

    /// True when `filename` matches any of the agent's exclusion patterns.
    pub fn should_skip(&self, agent: Agent, filename: &str) -> bool {
        self.exclude_patterns(agent)
            .iter()
            .any(|pattern| glob_match(pattern, filename))
    }

    fn exclude_patterns(&self, agent: Agent) -> &[String] {
        match agent {
            Agent::CodeReviewer => &self.doc.code_reviewer.exclude_patterns,
            Agent::BugFixer => &self.doc.bug_fixer.exclude_patterns,
            Agent::DocumentationWriter => &self.doc.documentation_writer.exclude_patterns,
        }
    }

    fn agent_model(&self, agent: Agent) -> Option<&str> {
        match agent {
            Agent::CodeReviewer => self.doc.code_reviewer.model.as_deref(),
            Agent::BugFixer => self.doc.bug_fixer.model.as_deref(),
            Agent::DocumentationWriter => self.doc.documentation_writer.model.as_deref(),
        }
    }

    fn agent_max_tokens(&self, agent: Agent) -> Option<u32> {
        match agent {
            Agent::CodeReviewer => self.doc.code_reviewer.max_tokens,
            Agent::BugFixer => self.doc.bug_fixer.max_tokens,
            Agent::DocumentationWriter => self.doc.documentation_writer.max_tokens,
        }
    }

    /// Agent model, inheriting the global model when unset. Resolution
    /// happens at read time; the stored document keeps the `null`.
    pub fn resolved_model(&self, agent: Agent) -> &str {
        self.agent_model(agent).unwrap_or(&self.doc.global.model)
    }

    /// Agent token limit, inheriting the global limit when unset.
    pub fn resolved_max_tokens(&self, agent: Agent) -> u32 {
        self.agent_max_tokens(agent)
            .unwrap_or(self.doc.global.max_tokens)
    }
}
