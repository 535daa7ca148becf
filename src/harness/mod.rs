//! Verification harness: loads the fixture, runs each example against it,
//! verifies the rows and collects a report.

use thiserror::Error;

pub mod catalog;
pub mod config;
pub mod fixture;
pub mod report;
pub mod runner;
pub mod verifier;

pub use catalog::Example;
pub use config::{HarnessConfig, ReportFormat};
pub use fixture::{Fixture, FixtureError};
pub use report::{Report, Verdict};
pub use runner::ResultRow;
pub use verifier::RowDiff;

use crate::{
    sql::engine::{Engine, KVEngine},
    storage::memory::MemoryEngine,
};

/// Errors that end a run before a report exists
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("unknown example {0}")]
    UnknownExample(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single example failed; the run carries on
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExampleError {
    #[error("query error: {0}")]
    Query(String),
    #[error("result mismatch:\n{0}")]
    Mismatch(RowDiff),
    #[error("timed out after {limit_ms} ms")]
    Timeout { limit_ms: u64 },
}

/// Runs the curriculum against the curriculum fixture
pub fn run(config: &HarnessConfig) -> Result<Report, HarnessError> {
    run_with(&Fixture::curriculum(), &catalog::curriculum(), config)
}

/// Loads `fixture` into a fresh in-memory backend and runs the examples
/// `config` selects, in catalog order.
///
/// Only a fixture that cannot be loaded, an unknown example name, or a
/// report that cannot be written fail the run. Every per-example failure
/// ends up in the report instead.
pub fn run_with(
    fixture: &Fixture,
    examples: &[Example],
    config: &HarnessConfig,
) -> Result<Report, HarnessError> {
    let selected = select(examples, &config.examples)?;
    fixture.validate()?;

    let engine = KVEngine::new(MemoryEngine::new());
    let mut session = engine.session().map_err(FixtureError::from)?;
    fixture.load(&mut session)?;

    let mut report = Report::new();
    for example in selected {
        let result = runner::run_example(&mut session, example, Some(config.timeout)).and_then(
            |rows| {
                verifier::verify(
                    &rows,
                    &example.expected,
                    example.order_sensitive,
                    example.tolerance,
                )
                .map_err(ExampleError::Mismatch)
            },
        );
        match &result {
            Ok(()) => tracing::info!(example = %example.name, "example passed"),
            Err(err) => tracing::warn!(example = %example.name, %err, "example failed"),
        }
        report.push(&example.name, Verdict::from(result));
    }
    tracing::info!(
        passed = report.passed(),
        failed = report.failed(),
        "run finished"
    );

    if let Some(path) = &config.report_path {
        report.write(path, config.format)?;
    }
    Ok(report)
}

/// Process exit status of a run: 0 when every example passed, 1 when any
/// failed or the run itself could not complete
pub fn exit_code(result: &Result<Report, HarnessError>) -> u8 {
    match result {
        Ok(report) => report.exit_code(),
        Err(_) => 1,
    }
}

/// The examples named in `names`, kept in catalog order; all when empty
fn select<'a>(examples: &'a [Example], names: &[String]) -> Result<Vec<&'a Example>, HarnessError> {
    if let Some(unknown) = names.iter().find(|n| catalog::find(examples, n).is_none()) {
        return Err(HarnessError::UnknownExample(unknown.clone()));
    }
    Ok(examples
        .iter()
        .filter(|e| names.is_empty() || names.contains(&e.name))
        .collect())
}
