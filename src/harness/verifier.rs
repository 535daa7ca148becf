//! Result comparison: expected rows against what the backend produced.

use std::fmt::Display;

use serde::Serialize;

use crate::{harness::runner::ResultRow, sql::types::Value};

/// How two row sequences differ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiff {
    pub expected_rows: usize,
    pub actual_rows: usize,
    pub differences: Vec<RowDifference>,
}

/// A single differing row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDifference {
    /// Position in the result (0-indexed), only in order-sensitive mode
    pub index: Option<usize>,
    pub kind: DifferenceKind,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    /// Both sides have a row at this position but they differ
    Mismatch,
    /// Expected row not produced
    Missing,
    /// Produced row not expected
    Unexpected,
}

impl Display for RowDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts_differ = self.expected_rows != self.actual_rows;
        if counts_differ {
            write!(f, "expected {} rows, got {}", self.expected_rows, self.actual_rows)?;
        }
        for (i, diff) in self.differences.iter().enumerate() {
            if i > 0 || counts_differ {
                writeln!(f)?;
            }
            let kind = match diff.kind {
                DifferenceKind::Mismatch => "mismatch",
                DifferenceKind::Missing => "missing",
                DifferenceKind::Unexpected => "unexpected",
            };
            write!(f, "{}", kind)?;
            if let Some(index) = diff.index {
                write!(f, " at row {}", index + 1)?;
            }
            write!(f, ":")?;
            if let Some(expected) = &diff.expected {
                write!(f, "\n  - {}", expected)?;
            }
            if let Some(actual) = &diff.actual {
                write!(f, "\n  + {}", actual)?;
            }
        }
        Ok(())
    }
}

/// Compares `actual` with `expected`.
///
/// Order-sensitive comparison pairs rows by position; otherwise rows are
/// matched as a multiset, so duplicates must appear equally often. Numbers
/// match within `tolerance` when one is given and exactly otherwise.
pub fn verify(
    actual: &[ResultRow],
    expected: &[ResultRow],
    order_sensitive: bool,
    tolerance: Option<f64>,
) -> Result<(), RowDiff> {
    let differences = if order_sensitive {
        diff_ordered(actual, expected, tolerance)
    } else {
        diff_unordered(actual, expected, tolerance)
    };
    if differences.is_empty() {
        Ok(())
    } else {
        Err(RowDiff {
            expected_rows: expected.len(),
            actual_rows: actual.len(),
            differences,
        })
    }
}

fn diff_ordered(actual: &[ResultRow], expected: &[ResultRow], tolerance: Option<f64>) -> Vec<RowDifference> {
    let mut differences = Vec::new();
    for i in 0..expected.len().max(actual.len()) {
        let (kind, exp, act) = match (expected.get(i), actual.get(i)) {
            (Some(e), Some(a)) if rows_equal(a, e, tolerance) => continue,
            (Some(e), Some(a)) => (DifferenceKind::Mismatch, Some(e), Some(a)),
            (Some(e), None) => (DifferenceKind::Missing, Some(e), None),
            (None, Some(a)) => (DifferenceKind::Unexpected, None, Some(a)),
            (None, None) => continue,
        };
        differences.push(RowDifference {
            index: Some(i),
            kind,
            expected: exp.map(ResultRow::to_string),
            actual: act.map(ResultRow::to_string),
        });
    }
    differences
}

fn diff_unordered(actual: &[ResultRow], expected: &[ResultRow], tolerance: Option<f64>) -> Vec<RowDifference> {
    let mut used = vec![false; actual.len()];
    let mut differences = Vec::new();
    for e in expected {
        let found = actual
            .iter()
            .enumerate()
            .position(|(i, a)| !used[i] && rows_equal(a, e, tolerance));
        match found {
            Some(i) => used[i] = true,
            None => differences.push(RowDifference {
                index: None,
                kind: DifferenceKind::Missing,
                expected: Some(e.to_string()),
                actual: None,
            }),
        }
    }
    for (a, _) in actual.iter().zip(&used).filter(|(_, used)| !**used) {
        differences.push(RowDifference {
            index: None,
            kind: DifferenceKind::Unexpected,
            expected: None,
            actual: Some(a.to_string()),
        });
    }
    differences
}

/// Same column names in the same order, pairwise equal values
pub fn rows_equal(actual: &ResultRow, expected: &ResultRow, tolerance: Option<f64>) -> bool {
    actual.0.len() == expected.0.len()
        && actual
            .0
            .iter()
            .zip(&expected.0)
            .all(|((an, av), (en, ev))| an == en && values_equal(av, ev, tolerance))
}

/// NULL equals only NULL; integers and floats compare numerically
pub fn values_equal(actual: &Value, expected: &Value, tolerance: Option<f64>) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => match tolerance {
            Some(t) => (a - e).abs() <= t,
            None => a == e,
        },
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::{verify, values_equal, DifferenceKind};
    use crate::{harness::runner::ResultRow, sql::types::Value};

    fn row(name: &str, age: i64) -> ResultRow {
        ResultRow(vec![
            ("name".into(), Value::from(name)),
            ("age".into(), Value::from(age)),
        ])
    }

    #[test]
    fn test_ordered_mismatch_reports_positions() {
        let expected = vec![row("Adewale Ogun", 41), row("John Doe", 30)];
        assert_eq!(verify(&expected.clone(), &expected, true, None), Ok(()));

        let swapped = vec![row("John Doe", 30), row("Adewale Ogun", 41)];
        let diff = verify(&swapped, &expected, true, None).unwrap_err();
        assert_eq!(diff.differences.len(), 2);
        assert_eq!(diff.differences[0].index, Some(0));
        assert_eq!(diff.differences[0].kind, DifferenceKind::Mismatch);

        // the same rows in any order pass when order does not matter
        assert_eq!(verify(&swapped, &expected, false, None), Ok(()));
    }

    #[test]
    fn test_unordered_counts_duplicates() {
        let expected = vec![row("John Doe", 30), row("John Doe", 30)];
        let actual = vec![row("John Doe", 30), row("Mary Smith", 25)];
        let diff = verify(&actual, &expected, false, None).unwrap_err();
        let kinds = diff.differences.iter().map(|d| d.kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec![DifferenceKind::Missing, DifferenceKind::Unexpected]);

        let short = verify(&actual[..1], &expected, true, None).unwrap_err();
        assert_eq!((short.expected_rows, short.actual_rows), (2, 1));
        assert!(short.to_string().starts_with("expected 2 rows, got 1"));
    }

    #[test]
    fn test_diff_display() {
        let expected = vec![row("Adewale Ogun", 41), row("John Doe", 30)];
        let actual = vec![row("Adewale Ogun", 40)];
        let diff = verify(&actual, &expected, true, None).unwrap_err();
        assert_eq!(
            diff.to_string(),
            "expected 2 rows, got 1\n\
             mismatch at row 1:\n\
             \x20 - (name: 'Adewale Ogun', age: 41)\n\
             \x20 + (name: 'Adewale Ogun', age: 40)\n\
             missing at row 2:\n\
             \x20 - (name: 'John Doe', age: 30)"
        );

        let extra = vec![row("Adewale Ogun", 41), row("John Doe", 30), row("Mary Smith", 25)];
        let diff = verify(&extra, &expected, false, None).unwrap_err();
        assert_eq!(
            diff.to_string(),
            "expected 2 rows, got 3\nunexpected:\n  + (name: 'Mary Smith', age: 25)"
        );
    }

    #[test]
    fn test_numeric_tolerance() {
        assert!(values_equal(&Value::from(35.5), &Value::from(35.54), Some(0.05)));
        assert!(!values_equal(&Value::from(35.5), &Value::from(35.6), Some(0.05)));
        assert!(!values_equal(&Value::from(35.5), &Value::from(35.54), None));
        assert!(values_equal(&Value::from(2), &Value::from(2.0), None));
        assert!(values_equal(&Value::Null, &Value::Null, Some(1.0)));
        assert!(!values_equal(&Value::Null, &Value::from(0), Some(1.0)));
        // column names must match as well
        let renamed = ResultRow(vec![("full_name".into(), Value::from("John Doe")), ("age".into(), Value::from(30))]);
        assert!(verify(&[renamed], &[row("John Doe", 30)], true, None).is_err());
    }
}
