use std::{fmt::Display, path::Path};

use serde::Serialize;

use crate::harness::{config::ReportFormat, verifier::RowDiff, ExampleError, HarnessError};

/// Outcome of a single example
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    /// Rows came back but differ from the expected ones
    Mismatch { diff: RowDiff },
    /// The backend rejected the query
    QueryError { message: String },
    /// The query ran past its execution bound
    Timeout { limit_ms: u64 },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl From<Result<(), ExampleError>> for Verdict {
    fn from(result: Result<(), ExampleError>) -> Self {
        match result {
            Ok(()) => Verdict::Pass,
            Err(ExampleError::Query(message)) => Verdict::QueryError { message },
            Err(ExampleError::Mismatch(diff)) => Verdict::Mismatch { diff },
            Err(ExampleError::Timeout { limit_ms }) => Verdict::Timeout { limit_ms },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleOutcome {
    pub name: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Verdicts of one run, in execution order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub outcomes: Vec<ExampleOutcome>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    passed: usize,
    failed: usize,
    failing: Vec<&'a str>,
    examples: &'a [ExampleOutcome],
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, verdict: Verdict) {
        self.outcomes.push(ExampleOutcome {
            name: name.to_string(),
            verdict,
        });
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.verdict.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn failing_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.verdict.is_pass())
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit status: 0 when every example passed, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.success() { 0 } else { 1 }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, HarnessError> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
        }
    }

    pub fn render_text(&self) -> String {
        self.to_string()
    }

    pub fn render_json(&self) -> Result<String, HarnessError> {
        let report = JsonReport {
            passed: self.passed(),
            failed: self.failed(),
            failing: self.failing_names(),
            examples: &self.outcomes,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    /// Writes the rendered report to `path`, replacing any existing file
    pub fn write(&self, path: &Path, format: ReportFormat) -> Result<(), HarnessError> {
        std::fs::write(path, self.render(format)?)?;
        tracing::info!(path = %path.display(), "report written");
        Ok(())
    }
}

/// One `PASS`/`FAIL` line per example with failure detail indented below
/// it, then the totals.
impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.outcomes {
            let status = if outcome.verdict.is_pass() { "PASS" } else { "FAIL" };
            writeln!(f, "{} {}", status, outcome.name)?;
            let detail = match &outcome.verdict {
                Verdict::Pass => continue,
                Verdict::Mismatch { diff } => diff.to_string(),
                Verdict::QueryError { message } => format!("query error: {}", message),
                Verdict::Timeout { limit_ms } => format!("timed out after {} ms", limit_ms),
            };
            for line in detail.lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        writeln!(f, "\n{} passed, {} failed", self.passed(), self.failed())?;
        if !self.success() {
            writeln!(f, "failing: {}", self.failing_names().join(", "))?;
        }
        Ok(())
    }
}
