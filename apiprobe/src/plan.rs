//! Test plan documents and the sequential runner.
//!
//! A plan is an ordered list of test cases; a case is an ordered list of
//! steps sharing optional auth and default parameter bags. Steps run
//! strictly in order: reconciliation of step N completes before resolution
//! of step N+1 begins, so history back-references never race their
//! producers.

use serde::{Deserialize, Serialize};

use crate::client::RestClient;
use crate::db::MirrorDb;
use crate::error::{Error, Result};
use crate::step::{Test, TestParams};

/// One named group of steps with shared defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestCase {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(flatten)]
    pub params: TestParams,
    pub tests: Vec<Test>,
}

/// Completed steps of the current run, looked up by step name for history
/// back-references.
#[derive(Debug, Default)]
pub struct TestHistory {
    tests: Vec<Test>,
}

impl TestHistory {
    #[must_use]
    pub fn get_test(&self, name: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn append(&mut self, test: Test) {
        self.tests.push(test);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestPlan {
    pub cases: Vec<TestCase>,
}

/// Outcome of a single executed step.
#[derive(Debug, Serialize)]
pub struct StepResult {
    pub case: String,
    pub test: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Aggregate of a plan run, including the executed step copies whose
/// `expect` fields now hold the observed results.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub steps: Vec<StepResult>,
    #[serde(skip)]
    pub executed: Vec<TestCase>,
}

impl RunSummary {
    #[must_use]
    pub fn has_transport_errors(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.error_kind == Some("http"))
    }

    /// The executed plan rendered back to YAML as a diffable artifact.
    ///
    /// # Errors
    /// Returns `Error::Invalid` if serialization fails.
    pub fn executed_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.executed)
            .map_err(|e| Error::Invalid(format!("failed to render executed plan: {e}")))
    }
}

impl TestPlan {
    /// Parses a plan document: a YAML list of test cases.
    ///
    /// # Errors
    /// Returns `Error::Invalid` if the document does not deserialize.
    pub fn from_yaml(text: &str) -> Result<TestPlan> {
        let cases: Vec<TestCase> = serde_yaml::from_str(text)
            .map_err(|e| Error::Invalid(format!("failed to parse test plan: {e}")))?;
        Ok(TestPlan { cases })
    }

    /// Reads and parses a plan from disk.
    ///
    /// # Errors
    /// Returns `Error::Invalid` when the file cannot be read or parsed.
    pub fn from_file(path: &str) -> Result<TestPlan> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Invalid(format!("failed to read {path}: {e}")))?;
        TestPlan::from_yaml(&text)
    }

    /// Finds a step template by name anywhere in the plan, for `ref`
    /// expansion.
    #[must_use]
    pub fn find_template(&self, name: &str) -> Option<&Test> {
        self.cases
            .iter()
            .flat_map(|c| c.tests.iter())
            .find(|t| t.name == name)
    }

    /// Runs every case in order, each step against the shared mirror.
    /// Templates are never mutated; executed copies are collected on the
    /// summary. With `fail_fast` the run stops at the first failing step.
    pub async fn run(&self, db: &MirrorDb, client: &RestClient, fail_fast: bool) -> RunSummary {
        let mut summary = RunSummary::default();
        for case in &self.cases {
            tracing::info!("=== case {}", case.name);
            let mut history = TestHistory::default();
            let mut executed_case = TestCase {
                tests: Vec::new(),
                ..case.clone()
            };
            for template in &case.tests {
                let mut test = template.duplicate();
                if !test.ref_name.is_empty() {
                    match self.find_template(&test.ref_name) {
                        Some(parent) => test.copy_parent(parent),
                        None => {
                            let err =
                                Error::NotFound(format!("ref {} not in the plan", test.ref_name));
                            record(&mut summary, case, &test, Some(&err));
                            if fail_fast {
                                summary.executed.push(executed_case);
                                return summary;
                            }
                            continue;
                        }
                    }
                }
                test.resolve_history(&history);
                let result = test.run(case, db, client).await;
                record(&mut summary, case, &test, result.as_ref().err());
                executed_case.tests.push(test.clone());
                history.append(test);
                if fail_fast && result.is_err() {
                    summary.executed.push(executed_case);
                    return summary;
                }
            }
            summary.executed.push(executed_case);
        }
        tracing::info!(
            "plan finished: {} passed, {} failed",
            summary.passed,
            summary.failed
        );
        summary
    }
}

fn record(summary: &mut RunSummary, case: &TestCase, test: &Test, error: Option<&Error>) {
    match error {
        None => {
            summary.passed += 1;
            summary.steps.push(StepResult {
                case: case.name.clone(),
                test: test.name.clone(),
                passed: true,
                error: None,
                error_kind: None,
            });
        }
        Some(e) => {
            summary.failed += 1;
            tracing::warn!("step {} failed: {e}", test.name);
            summary.steps.push(StepResult {
                case: case.name.clone(),
                test: test.name.clone(),
                passed: false,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
            });
        }
    }
}
