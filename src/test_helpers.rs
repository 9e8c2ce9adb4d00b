//! Shared mocks for unit and integration tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::llm::{Generation, GenerationRequest, Generator};
use crate::oracle::{OracleVerdict, TestOracle};
use crate::store::{Issue, IssueStore};

/// Generator returning scripted responses in order.
pub struct MockGenerator {
    responses: Mutex<Vec<Result<Generation>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new(responses: Vec<Result<Generation>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl Generator for MockGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(Error::Generation("no more mock generations".to_string()))
        } else {
            responses.remove(0)
        }
    }
}

enum OracleMode {
    AlwaysPass,
    AlwaysFail,
    PassOnRun(u32),
    AlwaysError,
}

/// Test oracle with a scripted verdict pattern.
pub struct MockOracle {
    runs: AtomicU32,
    mode: OracleMode,
}

impl MockOracle {
    pub fn always_pass() -> Self {
        Self {
            runs: AtomicU32::new(0),
            mode: OracleMode::AlwaysPass,
        }
    }

    pub fn always_fail() -> Self {
        Self {
            runs: AtomicU32::new(0),
            mode: OracleMode::AlwaysFail,
        }
    }

    /// Fails until run number `n`, passes from then on.
    pub fn pass_on_run(n: u32) -> Self {
        Self {
            runs: AtomicU32::new(0),
            mode: OracleMode::PassOnRun(n),
        }
    }

    pub fn always_error() -> Self {
        Self {
            runs: AtomicU32::new(0),
            mode: OracleMode::AlwaysError,
        }
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

impl TestOracle for MockOracle {
    async fn run(&self) -> Result<OracleVerdict> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        match self.mode {
            OracleMode::AlwaysPass => Ok(OracleVerdict::Passed),
            OracleMode::AlwaysFail => Ok(OracleVerdict::Failed {
                output: "1 test failed".to_string(),
            }),
            OracleMode::PassOnRun(n) if run >= n => Ok(OracleVerdict::Passed),
            OracleMode::PassOnRun(_) => Ok(OracleVerdict::Failed {
                output: "1 test failed".to_string(),
            }),
            OracleMode::AlwaysError => Err(Error::Oracle("oracle offline".to_string())),
        }
    }
}

/// Issue store that accepts every write and remembers nothing.
#[derive(Default)]
pub struct NullStore;

impl IssueStore for NullStore {
    fn list_by_label(&self, _label: &str) -> Result<Vec<Issue>> {
        Ok(Vec::new())
    }

    fn create(&self, _title: &str, _body: &str, _label: &str) -> Result<u64> {
        Ok(1)
    }

    fn update_body(&self, _number: u64, _body: &str) -> Result<()> {
        Ok(())
    }

    fn comment(&self, _number: u64, _body: &str) -> Result<()> {
        Ok(())
    }
}

/// In-memory issue store that behaves like the real tracker.
#[derive(Default)]
pub struct MemoryIssueStore {
    issues: Mutex<Vec<Issue>>,
    comments: Mutex<Vec<(u64, String)>>,
}

impl MemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.issues.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.comments.lock().unwrap().clone()
    }
}

impl IssueStore for MemoryIssueStore {
    fn list_by_label(&self, _label: &str) -> Result<Vec<Issue>> {
        Ok(self.issues.lock().unwrap().clone())
    }

    fn create(&self, title: &str, body: &str, _label: &str) -> Result<u64> {
        let mut issues = self.issues.lock().unwrap();
        let number = issues.len() as u64 + 1;
        issues.push(Issue {
            number,
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(number)
    }

    fn update_body(&self, number: u64, body: &str) -> Result<()> {
        let mut issues = self.issues.lock().unwrap();
        let issue = issues
            .iter_mut()
            .find(|i| i.number == number)
            .ok_or_else(|| Error::IssueStore(format!("no issue #{number}")))?;
        issue.body = body.to_string();
        Ok(())
    }

    fn comment(&self, number: u64, body: &str) -> Result<()> {
        self.comments
            .lock()
            .unwrap()
            .push((number, body.to_string()));
        Ok(())
    }
}
