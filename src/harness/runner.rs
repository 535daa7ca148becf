use std::{fmt::Display, time::Duration};

use serde::Serialize;

use crate::{
    error::Error,
    harness::{catalog::Example, ExampleError},
    sql::{
        engine::{Engine, Session},
        executor::ResultSet,
        types::Value,
    },
};

/// One result row: column names paired with values, in select-list order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow(pub Vec<(String, Value)>);

impl ResultRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }
}

impl Display for ResultRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Value::String(s) => write!(f, "{}: '{}'", name, s)?,
                v => write!(f, "{}: {}", name, v)?,
            }
        }
        write!(f, ")")
    }
}

/// Runs one example against a snapshot of the fixture and returns its rows
/// in the order the backend produced them.
///
/// Statements that modify data report a single `rows_affected` row; their
/// changes are rolled back with the snapshot.
pub fn run_example<E: Engine + 'static>(
    session: &mut Session<E>,
    example: &Example,
    timeout: Option<Duration>,
) -> Result<Vec<ResultRow>, ExampleError> {
    tracing::debug!(example = %example.name, "running example");
    let result = session.query_snapshot(&example.query, timeout).map_err(|err| match err {
        Error::Timeout(limit_ms) => ExampleError::Timeout { limit_ms },
        err => ExampleError::Query(err.to_string()),
    })?;

    Ok(match result {
        ResultSet::Scan { columns, rows } => rows
            .into_iter()
            .map(|row| ResultRow(columns.iter().cloned().zip(row).collect()))
            .collect(),
        ResultSet::Insert { count } | ResultSet::Update { count } | ResultSet::Delete { count } => {
            vec![ResultRow(vec![(
                "rows_affected".to_string(),
                Value::Integer(count as i64),
            )])]
        }
        ResultSet::CreateTable { .. } => Vec::new(),
    })
}
