use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Agent;
use crate::error::{Error, Result};
use crate::store::IssueStore;

/// Label the monthly usage issues carry in the tracker.
pub const USAGE_LABEL: &str = "ai-usage";

/// Per-token prices for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

fn price_for(model: &str) -> Option<ModelPrice> {
    match model {
        "gpt-4o-mini" => Some(ModelPrice {
            input: 0.00015 / 1000.0,
            output: 0.0006 / 1000.0,
        }),
        "gpt-4o" => Some(ModelPrice {
            input: 0.0025 / 1000.0,
            output: 0.01 / 1000.0,
        }),
        _ => None,
    }
}

/// Cost of a single request against the static price table.
pub fn cost(model: &str, input_tokens: u64, output_tokens: u64) -> Result<f64> {
    let price = price_for(model).ok_or_else(|| Error::UnknownModel(model.to_string()))?;
    Ok(input_tokens as f64 * price.input + output_tokens as f64 * price.output)
}

/// The current calendar month key, `YYYY-MM`.
pub fn current_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}

pub fn monthly_title(month: &str) -> String {
    format!("AI Usage - {month}")
}

/// Pull the running total out of a persisted issue body.
///
/// The total lives in free text; a missing or garbled marker defaults to
/// zero rather than failing the whole request.
pub fn extract_total(body: &str) -> f64 {
    let re = Regex::new(r"\*\*Spent:\*\* \$(\d+(?:\.\d+)?)").expect("static regex compiles");
    re.captures(body)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostReport {
    pub cost: f64,
    pub monthly_total: f64,
}

/// Tracks per-request spend and keeps a running monthly total in the
/// issue tracker.
pub struct CostLedger<S> {
    store: S,
    monthly_budget: f64,
    pr_number: Option<u64>,
}

impl<S: IssueStore> CostLedger<S> {
    pub fn new(store: S, monthly_budget: f64, pr_number: Option<u64>) -> Self {
        Self {
            store,
            monthly_budget,
            pr_number,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compute the request cost and fold it into the current month's issue.
    pub fn record_and_total(
        &self,
        agent: Agent,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<CostReport> {
        self.record_in_month(agent, model, input_tokens, output_tokens, &current_month())
    }

    /// As `record_and_total`, with the month pinned by the caller.
    pub fn record_in_month(
        &self,
        agent: Agent,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        month: &str,
    ) -> Result<CostReport> {
        let request_cost = cost(model, input_tokens, output_tokens)?;
        let monthly_total = self.update_monthly_issue(agent, request_cost, month)?;
        info!(
            agent = %agent,
            model,
            cost = request_cost,
            monthly_total,
            "recorded request cost"
        );
        Ok(CostReport {
            cost: request_cost,
            monthly_total,
        })
    }

    /// Read-modify-write of the month's issue. There is no optimistic
    /// concurrency check: two writers racing on the same month lose one
    /// update (last write wins), which the tracker cannot prevent.
    fn update_monthly_issue(&self, agent: Agent, request_cost: f64, month: &str) -> Result<f64> {
        let title = monthly_title(month);
        let issues = self.store.list_by_label(USAGE_LABEL)?;

        match issues.iter().find(|i| i.title == title) {
            Some(issue) => {
                let previous = extract_total(&issue.body);
                let total = previous + request_cost;
                debug!(previous, request_cost, total, "accumulating monthly spend");
                self.store
                    .update_body(issue.number, &self.render_body(total, agent, request_cost))?;
                Ok(total)
            }
            None => {
                self.store.create(
                    &title,
                    &self.render_body(request_cost, agent, request_cost),
                    USAGE_LABEL,
                )?;
                Ok(request_cost)
            }
        }
    }

    /// Current month's running total; zero when no issue exists yet.
    pub fn current_total(&self) -> Result<f64> {
        let title = monthly_title(&current_month());
        let issues = self.store.list_by_label(USAGE_LABEL)?;
        Ok(issues
            .iter()
            .find(|i| i.title == title)
            .map(|i| extract_total(&i.body))
            .unwrap_or(0.0))
    }

    /// Post a budget alert on the in-review PR, when there is one.
    ///
    /// No-op outside a PR context. Posting failures are logged and
    /// swallowed so cost commentary never blocks the primary operation.
    pub fn maybe_warn_budget(&self, monthly_total: f64) {
        let Some(pr_number) = self.pr_number else {
            debug!("not in PR context, skipping budget warning");
            return;
        };

        let percent = (monthly_total / self.monthly_budget * 100.0).round();
        let body = format!(
            "**AI Budget Alert**\n\n\
             We've used {percent}% of our monthly AI budget.\n\n\
             **Current:** ${monthly_total:.2} / ${budget}\n\
             **Remaining:** ${remaining:.2}\n\n\
             Consider switching to gpt-4o-mini for cost savings.",
            budget = self.monthly_budget,
            remaining = self.monthly_budget - monthly_total,
        );

        if let Err(e) = self.store.comment(pr_number, &body) {
            warn!(pr_number, error = %e, "failed to post budget warning");
        }
    }

    fn render_body(&self, total: f64, last_agent: Agent, last_cost: f64) -> String {
        let percent = (total / self.monthly_budget * 100.0).round();
        let updated = Utc::now().format("%Y-%m-%d %H:%M");
        format!(
            "## Monthly AI Usage\n\n\
             **Budget:** ${budget}\n\
             **Spent:** ${total:.6} ({percent}%)\n\
             **Remaining:** ${remaining:.2}\n\n\
             **Latest:** {last_agent} used ${last_cost:.6}\n\n\
             *Updated: {updated}*",
            budget = self.monthly_budget,
            remaining = self.monthly_budget - total,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Issue;
    use std::cell::RefCell;

    /// In-memory issue store recording every mutation.
    pub struct MemoryStore {
        issues: RefCell<Vec<Issue>>,
        comments: RefCell<Vec<(u64, String)>>,
        fail_all: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                issues: RefCell::new(Vec::new()),
                comments: RefCell::new(Vec::new()),
                fail_all: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_all: true,
                ..Self::new()
            }
        }

        fn seeded(issues: Vec<Issue>) -> Self {
            Self {
                issues: RefCell::new(issues),
                ..Self::new()
            }
        }

        fn body_of(&self, number: u64) -> String {
            self.issues
                .borrow()
                .iter()
                .find(|i| i.number == number)
                .map(|i| i.body.clone())
                .unwrap()
        }
    }

    impl IssueStore for MemoryStore {
        fn list_by_label(&self, _label: &str) -> Result<Vec<Issue>> {
            if self.fail_all {
                return Err(Error::IssueStore("store offline".into()));
            }
            Ok(self.issues.borrow().clone())
        }

        fn create(&self, title: &str, body: &str, _label: &str) -> Result<u64> {
            if self.fail_all {
                return Err(Error::IssueStore("store offline".into()));
            }
            let number = self.issues.borrow().len() as u64 + 1;
            self.issues.borrow_mut().push(Issue {
                number,
                title: title.to_string(),
                body: body.to_string(),
            });
            Ok(number)
        }

        fn update_body(&self, number: u64, body: &str) -> Result<()> {
            let mut issues = self.issues.borrow_mut();
            let issue = issues
                .iter_mut()
                .find(|i| i.number == number)
                .ok_or_else(|| Error::IssueStore(format!("no issue #{number}")))?;
            issue.body = body.to_string();
            Ok(())
        }

        fn comment(&self, number: u64, body: &str) -> Result<()> {
            if self.fail_all {
                return Err(Error::IssueStore("store offline".into()));
            }
            self.comments.borrow_mut().push((number, body.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_cost_gpt_4o_mini_exact() {
        let c = cost("gpt-4o-mini", 1000, 1000).unwrap();
        assert_eq!(c, 1000.0 * (0.00015 / 1000.0) + 1000.0 * (0.0006 / 1000.0));
        assert!((c - 0.00075).abs() < 1e-12);
    }

    #[test]
    fn test_cost_gpt_4o() {
        let c = cost("gpt-4o", 2000, 500).unwrap();
        let expected = 2000.0 * 0.0025 / 1000.0 + 500.0 * 0.01 / 1000.0;
        assert!((c - expected).abs() < 1e-12);
    }

    #[test]
    fn test_cost_unknown_model_fails() {
        let err = cost("gpt-5-nano", 10, 10).unwrap_err();
        assert!(matches!(err, Error::UnknownModel(_)));
        assert!(err.to_string().contains("gpt-5-nano"));
    }

    #[test]
    fn test_extract_total_present() {
        let body = "## Monthly AI Usage\n\n**Budget:** $50\n**Spent:** $1.234567 (2%)";
        assert!((extract_total(body) - 1.234567).abs() < 1e-12);
    }

    #[test]
    fn test_extract_total_integer() {
        assert_eq!(extract_total("**Spent:** $3 (6%)"), 3.0);
    }

    #[test]
    fn test_extract_total_absent_defaults_to_zero() {
        assert_eq!(extract_total("someone edited this issue by hand"), 0.0);
        assert_eq!(extract_total(""), 0.0);
    }

    #[test]
    fn test_record_creates_monthly_issue() {
        let ledger = CostLedger::new(MemoryStore::new(), 50.0, None);
        let report = ledger
            .record_in_month(Agent::BugFixer, "gpt-4o-mini", 1000, 1000, "2026-08")
            .unwrap();

        assert!((report.cost - 0.00075).abs() < 1e-12);
        assert!((report.monthly_total - 0.00075).abs() < 1e-12);

        let issues = ledger.store().issues.borrow();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "AI Usage - 2026-08");
        assert!(issues[0].body.contains("**Spent:** $0.000750"));
        assert!(issues[0].body.contains("bugFixer"));
    }

    #[test]
    fn test_record_accumulates_within_month() {
        let ledger = CostLedger::new(MemoryStore::new(), 50.0, None);
        let first = ledger
            .record_in_month(Agent::BugFixer, "gpt-4o-mini", 1000, 1000, "2026-08")
            .unwrap();
        let second = ledger
            .record_in_month(Agent::CodeReviewer, "gpt-4o-mini", 1000, 1000, "2026-08")
            .unwrap();

        assert!((second.monthly_total - (first.cost + second.cost)).abs() < 1e-9);
        let body = ledger.store().body_of(1);
        assert!(body.contains("codeReviewer"));
    }

    #[test]
    fn test_record_new_month_starts_fresh() {
        let ledger = CostLedger::new(MemoryStore::new(), 50.0, None);
        ledger
            .record_in_month(Agent::BugFixer, "gpt-4o-mini", 1000, 1000, "2026-07")
            .unwrap();
        let report = ledger
            .record_in_month(Agent::BugFixer, "gpt-4o-mini", 1000, 1000, "2026-08")
            .unwrap();

        // The new month key gets its own issue and its own total
        assert!((report.monthly_total - 0.00075).abs() < 1e-12);
        assert_eq!(ledger.store().issues.borrow().len(), 2);
    }

    #[test]
    fn test_record_recovers_from_garbled_body() {
        let ledger = CostLedger::new(
            MemoryStore::seeded(vec![Issue {
                number: 1,
                title: "AI Usage - 2026-08".to_string(),
                body: "hand-edited, marker gone".to_string(),
            }]),
            50.0,
            None,
        );
        let report = ledger
            .record_in_month(Agent::BugFixer, "gpt-4o-mini", 1000, 1000, "2026-08")
            .unwrap();
        // Previous total defaulted to zero, not an error
        assert!((report.monthly_total - 0.00075).abs() < 1e-12);
    }

    #[test]
    fn test_record_unknown_model_propagates() {
        let ledger = CostLedger::new(MemoryStore::new(), 50.0, None);
        let err = ledger
            .record_in_month(Agent::BugFixer, "nope", 1, 1, "2026-08")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownModel(_)));
        // Nothing was written
        assert!(ledger.store().issues.borrow().is_empty());
    }

    #[test]
    fn test_warn_budget_posts_in_pr_context() {
        let ledger = CostLedger::new(MemoryStore::new(), 50.0, Some(99));
        ledger.maybe_warn_budget(25.0);

        let comments = ledger.store().comments.borrow();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 99);
        assert!(comments[0].1.contains("50%"));
        assert!(comments[0].1.contains("**Remaining:** $25.00"));
    }

    #[test]
    fn test_warn_budget_noop_without_pr() {
        let ledger = CostLedger::new(MemoryStore::new(), 50.0, None);
        ledger.maybe_warn_budget(25.0);
        assert!(ledger.store().comments.borrow().is_empty());
    }

    #[test]
    fn test_warn_budget_swallows_store_failure() {
        let ledger = CostLedger::new(MemoryStore::failing(), 50.0, Some(1));
        // Must not panic or propagate
        ledger.maybe_warn_budget(10.0);
    }

    #[test]
    fn test_current_total_without_issue() {
        let ledger = CostLedger::new(MemoryStore::new(), 50.0, None);
        assert_eq!(ledger.current_total().unwrap(), 0.0);
    }

    #[test]
    fn test_monthly_title_format() {
        assert_eq!(monthly_title("2026-08"), "AI Usage - 2026-08");
    }
}
