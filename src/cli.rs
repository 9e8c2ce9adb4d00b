use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// mend — LLM agents that review, fix, and document code
#[derive(Parser, Debug, Clone)]
#[command(name = "mend", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to the agent configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Prompt template directory
    #[arg(long, global = true, default_value = "prompts")]
    pub prompts_dir: String,

    /// PR number for budget warnings and CI commentary (default: $PR_NUMBER)
    #[arg(long, global = true)]
    pub pr_number: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Review source files for issues
    Review {
        /// Files to review
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Attempt an automated bug fix with test validation
    Fix {
        /// File to fix
        file: String,

        /// Error context to embed in the prompt
        #[arg(long, default_value = "")]
        error: String,
    },

    /// Generate documentation for source files
    Doc {
        /// Files to document
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Run the test suite and fix the implicated file (CI mode)
    CiFix,

    /// Document API files changed by the last commit (CI mode)
    CiDocs,

    /// Write the default configuration file
    Init,

    /// List loaded prompt templates
    Prompts {
        /// Limit output to one agent
        #[arg(long)]
        agent: Option<String>,
    },

    /// Show the current month's AI spend
    Cost,
}
