use std::path::Path;

use mend::ci::run_ci_docs;
use mend::config::{ConfigDocument, ConfigStore};
use mend::cost::CostLedger;
use mend::docwriter::DocumentationWriter;
use mend::git;
use mend::llm::Generation;
use mend::templates::TemplateEngine;
use mend::test_helpers::{MemoryIssueStore, MockGenerator};
use tempfile::TempDir;

fn init_repo(root: &Path) {
    git::git_in_dir(root, &["init", "-q", "-b", "main"]).unwrap();
    git::git_in_dir(root, &["config", "user.email", "ci@example.com"]).unwrap();
    git::git_in_dir(root, &["config", "user.name", "ci"]).unwrap();
}

fn commit_all(root: &Path, message: &str) {
    git::stage_all(root).unwrap();
    git::commit(root, message).unwrap();
}

fn generation(text: &str) -> Generation {
    Generation {
        text: text.to_string(),
        prompt_tokens: 500,
        completion_tokens: 200,
    }
}

#[test]
fn documents_changed_api_files_and_comments_on_pr() {
    let repo = TempDir::new().unwrap();
    let root = repo.path();
    init_repo(root);

    std::fs::write(root.join("readme.txt"), "base").unwrap();
    commit_all(root, "base");

    std::fs::create_dir_all(root.join("api")).unwrap();
    std::fs::write(root.join("api/users.js"), "export function list() {}").unwrap();
    std::fs::write(root.join("helper.js"), "not api").unwrap();
    commit_all(root, "add users endpoint");

    let config = ConfigStore::from_document(ConfigDocument::default());
    let templates = TemplateEngine::defaults();
    let generator = MockGenerator::new(vec![Ok(generation("# Users API\n\nList users."))]);
    let store = MemoryIssueStore::new();
    let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
    let writer = DocumentationWriter::new(
        &config,
        &templates,
        &generator,
        &ledger,
        root.to_path_buf(),
    );

    run_ci_docs(&writer, &store, Some(7), root).unwrap();

    // Only the API file was documented
    assert_eq!(generator.calls(), 1);
    assert_eq!(
        std::fs::read_to_string(root.join("docs/api/users.md")).unwrap(),
        "# Users API\n\nList users."
    );

    // Docs were committed (push fails without a remote and is swallowed)
    let log = git::git_in_dir(root, &["log", "--oneline"]).unwrap();
    assert!(log.contains("Auto-update docs for: users.js"));

    // And the PR got a summary comment
    let comments = store.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].0, 7);
    assert!(comments[0].1.contains("api/users.js"));
}

#[test]
fn no_api_changes_is_a_clean_noop() {
    let repo = TempDir::new().unwrap();
    let root = repo.path();
    init_repo(root);

    std::fs::write(root.join("readme.txt"), "base").unwrap();
    commit_all(root, "base");
    std::fs::write(root.join("cart.js"), "not api").unwrap();
    commit_all(root, "non-api change");

    let config = ConfigStore::from_document(ConfigDocument::default());
    let templates = TemplateEngine::defaults();
    let generator = MockGenerator::new(vec![]);
    let store = MemoryIssueStore::new();
    let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
    let writer = DocumentationWriter::new(
        &config,
        &templates,
        &generator,
        &ledger,
        root.to_path_buf(),
    );

    run_ci_docs(&writer, &store, Some(7), root).unwrap();

    assert_eq!(generator.calls(), 0);
    assert!(store.comments().is_empty());
    assert!(!root.join("docs").exists());
}

#[test]
fn disabled_writer_documents_nothing() {
    let repo = TempDir::new().unwrap();
    let root = repo.path();
    init_repo(root);

    std::fs::write(root.join("readme.txt"), "base").unwrap();
    commit_all(root, "base");
    std::fs::create_dir_all(root.join("api")).unwrap();
    std::fs::write(root.join("api/users.js"), "handler").unwrap();
    commit_all(root, "add api");

    let mut doc = ConfigDocument::default();
    doc.documentation_writer.enabled = false;
    let config = ConfigStore::from_document(doc);
    let templates = TemplateEngine::defaults();
    let generator = MockGenerator::new(vec![]);
    let store = MemoryIssueStore::new();
    let ledger = CostLedger::new(MemoryIssueStore::new(), 50.0, None);
    let writer = DocumentationWriter::new(
        &config,
        &templates,
        &generator,
        &ledger,
        root.to_path_buf(),
    );

    run_ci_docs(&writer, &store, None, root).unwrap();

    assert_eq!(generator.calls(), 0);
    assert!(!root.join("docs").exists());
    assert!(store.comments().is_empty());
}
