use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use mend::ci;
use mend::cli::{Cli, CliCommand};
use mend::config::ConfigStore;
use mend::cost::CostLedger;
use mend::docwriter::{DocOutcome, DocumentationWriter};
use mend::error::Result;
use mend::fixer::{BugFixer, FixOutcome};
use mend::llm::{OpenAiGenerator, resolve_api_key};
use mend::oracle::CommandOracle;
use mend::reviewer::{CodeReviewer, ReviewOutcome};
use mend::store::GhIssueStore;
use mend::templates::TemplateEngine;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// PR context: explicit flag first, then the CI environment.
fn resolve_pr_number(cli: &Cli) -> Option<u64> {
    cli.pr_number
        .or_else(|| std::env::var("PR_NUMBER").ok()?.parse().ok())
        .or_else(|| std::env::var("GITHUB_EVENT_NUMBER").ok()?.parse().ok())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    info!("mend starting");

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigStore::load(&cli.config);
    let pr_number = resolve_pr_number(&cli);
    let repo_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    match cli.command {
        CliCommand::Init => {
            config.save()?;
            println!("wrote {}", config.path().display());
            Ok(())
        }

        CliCommand::Prompts { agent } => {
            let templates = TemplateEngine::load(&cli.prompts_dir);
            let agents = match agent {
                Some(agent) => vec![agent],
                None => templates.agents(),
            };
            for agent in agents {
                println!("{agent}:");
                for name in templates.list(&agent) {
                    println!("  {name}");
                }
            }
            Ok(())
        }

        CliCommand::Cost => {
            let ledger = CostLedger::new(
                GhIssueStore::new(),
                config.global().monthly_budget,
                pr_number,
            );
            let total = ledger.current_total()?;
            println!(
                "monthly spend: ${total:.4} of ${budget} budget",
                budget = config.global().monthly_budget
            );
            Ok(())
        }

        CliCommand::Review { files } => {
            let templates = TemplateEngine::load(&cli.prompts_dir);
            let generator = OpenAiGenerator::new(resolve_api_key("OPENAI_API_KEY")?);
            let ledger = CostLedger::new(
                GhIssueStore::new(),
                config.global().monthly_budget,
                pr_number,
            );
            let reviewer = CodeReviewer::new(&config, &templates, &generator, &ledger);

            for file in &files {
                match reviewer.review_file(file)? {
                    ReviewOutcome::Reviewed(review) => {
                        println!("## {}\n\n{}\n", review.filename, review.analysis);
                    }
                    ReviewOutcome::Skipped { reason } => {
                        println!("skipped {file} ({reason})");
                    }
                }
            }
            Ok(())
        }

        CliCommand::Fix { file, error } => {
            let templates = TemplateEngine::load(&cli.prompts_dir);
            let generator = OpenAiGenerator::new(resolve_api_key("OPENAI_API_KEY")?);
            let ledger = CostLedger::new(
                GhIssueStore::new(),
                config.global().monthly_budget,
                pr_number,
            );
            let oracle =
                CommandOracle::new(config.global().test_command.clone(), repo_root.clone());
            let fixer = BugFixer::new(
                &config,
                &templates,
                &generator,
                &oracle,
                &ledger,
                repo_root,
            );

            match fixer.fix_file(&file, &error).await? {
                FixOutcome::Fixed {
                    attempts,
                    cost,
                    monthly_total,
                } => {
                    println!(
                        "fixed {file} in {attempts} attempt(s) (cost ${cost:.4}, monthly ${monthly_total:.2})"
                    );
                    Ok(())
                }
                FixOutcome::Skipped { reason } => {
                    println!("skipped {file} ({reason})");
                    Ok(())
                }
                FixOutcome::Exhausted { attempts, error } => {
                    eprintln!("{error} ({attempts} attempts), {file} left unchanged");
                    std::process::exit(1);
                }
            }
        }

        CliCommand::Doc { files } => {
            let templates = TemplateEngine::load(&cli.prompts_dir);
            let generator = OpenAiGenerator::new(resolve_api_key("OPENAI_API_KEY")?);
            let ledger = CostLedger::new(
                GhIssueStore::new(),
                config.global().monthly_budget,
                pr_number,
            );
            let writer =
                DocumentationWriter::new(&config, &templates, &generator, &ledger, repo_root);

            for file in &files {
                match writer.generate_docs(file)? {
                    DocOutcome::Written { doc_path } => {
                        println!("wrote {}", doc_path.display());
                    }
                    DocOutcome::Skipped { reason } => {
                        println!("skipped {file} ({reason})");
                    }
                }
            }
            Ok(())
        }

        CliCommand::CiFix => {
            let templates = TemplateEngine::load(&cli.prompts_dir);
            let generator = OpenAiGenerator::new(resolve_api_key("OPENAI_API_KEY")?);
            let ledger = CostLedger::new(
                GhIssueStore::new(),
                config.global().monthly_budget,
                pr_number,
            );
            let oracle =
                CommandOracle::new(config.global().test_command.clone(), repo_root.clone());
            let fixer = BugFixer::new(
                &config,
                &templates,
                &generator,
                &oracle,
                &ledger,
                repo_root.clone(),
            );

            ci::run_ci_fix(&fixer, &oracle, &repo_root).await
        }

        CliCommand::CiDocs => {
            let templates = TemplateEngine::load(&cli.prompts_dir);
            let generator = OpenAiGenerator::new(resolve_api_key("OPENAI_API_KEY")?);
            let ledger = CostLedger::new(
                GhIssueStore::new(),
                config.global().monthly_budget,
                pr_number,
            );
            let writer = DocumentationWriter::new(
                &config,
                &templates,
                &generator,
                &ledger,
                repo_root.clone(),
            );
            let store = GhIssueStore::new();

            ci::run_ci_docs(&writer, &store, pr_number, &repo_root)
        }
    }
}
