use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{is_true, ResultSet},
        parser::ast::{evaluate_expr, Expression, OrderDirection},
        types::{Row, Value},
    },
};

use super::Executor;

/// Table scan executor (SELECT)
pub struct Scan {
    table_name: String,
    alias: Option<String>,
    filter: Option<Expression>,
}

impl Scan {
    pub fn new(table_name: String, alias: Option<String>, filter: Option<Expression>) -> Box<Self> {
        Box::new(Self {
            table_name,
            alias,
            filter,
        })
    }
}

impl<T: Transaction> Executor<T> for Scan {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(self.table_name.clone())?;
        let rows = txn.scan_table(self.table_name.clone(), self.filter)?;
        let qualifier = self.alias.unwrap_or(self.table_name);
        Ok(ResultSet::Scan {
            columns: table
                .columns
                .into_iter()
                .map(|c| format!("{}.{}", qualifier, c.name))
                .collect(),
            rows,
        })
    }
}

/// WHERE / HAVING executor
pub struct Filter<T: Transaction> {
    source: Box<dyn Executor<T>>,
    predicate: Expression,
}

impl<T: Transaction> Filter<T> {
    pub fn new(source: Box<dyn Executor<T>>, predicate: Expression) -> Box<Self> {
        Box::new(Self { source, predicate })
    }
}

impl<T: Transaction> Executor<T> for Filter<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;
        let mut kept = Vec::new();
        for row in rows {
            if is_true(evaluate_expr(&self.predicate, &columns, &row)?)? {
                kept.push(row);
            }
        }
        Ok(ResultSet::Scan {
            columns,
            rows: kept,
        })
    }
}

/// SELECT list executor
pub struct Projection<T: Transaction> {
    source: Box<dyn Executor<T>>,
    exprs: Vec<(Expression, Option<String>)>,
}

impl<T: Transaction> Projection<T> {
    pub fn new(source: Box<dyn Executor<T>>, exprs: Vec<(Expression, Option<String>)>) -> Box<Self> {
        Box::new(Self { source, exprs })
    }
}

impl<T: Transaction> Executor<T> for Projection<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;

        // SELECT *: every column under its bare name, hidden columns dropped
        if self.exprs.is_empty() {
            let visible = columns
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.starts_with('#'))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();
            return Ok(ResultSet::Scan {
                columns: visible.iter().map(|&i| bare_name(&columns[i])).collect(),
                rows: rows
                    .into_iter()
                    .map(|row| visible.iter().map(|&i| row[i].clone()).collect())
                    .collect(),
            });
        }

        let mut new_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            new_rows.push(
                self.exprs
                    .iter()
                    .map(|(expr, _)| evaluate_expr(expr, &columns, row))
                    .collect::<Result<Row>>()?,
            );
        }
        Ok(ResultSet::Scan {
            columns: self
                .exprs
                .into_iter()
                .map(|(expr, alias)| alias.unwrap_or_else(|| expr.column_name()))
                .collect(),
            rows: new_rows,
        })
    }
}

/// Column part of a label, `c.name` → `name`
pub(super) fn bare_name(label: &str) -> String {
    match label.rsplit_once('.') {
        Some((_, name)) => name.to_string(),
        None => label.to_string(),
    }
}

/// Sorts `rows` by precomputed keys, stably. Incomparable keys are an error.
pub(super) fn sort_rows(
    rows: Vec<Row>,
    keys: Vec<Vec<Value>>,
    directions: &[OrderDirection],
) -> Result<Vec<Row>> {
    let mut keyed = keys.into_iter().zip(rows).collect::<Vec<_>>();
    let mut error = None;
    keyed.sort_by(|(k1, _), (k2, _)| {
        compare_keys(k1, k2, directions).unwrap_or_else(|e| {
            error.get_or_insert(e);
            Ordering::Equal
        })
    });
    match error {
        Some(e) => Err(e),
        None => Ok(keyed.into_iter().map(|(_, row)| row).collect()),
    }
}

/// Multi-column comparison: the first unequal column decides, reversed for DESC
pub(super) fn compare_keys(
    k1: &[Value],
    k2: &[Value],
    directions: &[OrderDirection],
) -> Result<Ordering> {
    for ((x, y), direction) in k1.iter().zip(k2).zip(directions) {
        match x.sort_cmp(y)? {
            Ordering::Equal => {}
            o if *direction == OrderDirection::Asc => return Ok(o),
            o => return Ok(o.reverse()),
        }
    }
    Ok(Ordering::Equal)
}

/// ORDER BY executor - sorts rows by the given expressions
pub struct Order<T: Transaction> {
    source: Box<dyn Executor<T>>,
    order_by: Vec<(Expression, OrderDirection)>,
}

impl<T: Transaction> Order<T> {
    pub fn new(source: Box<dyn Executor<T>>, order_by: Vec<(Expression, OrderDirection)>) -> Box<Self> {
        Box::new(Self { source, order_by })
    }
}

impl<T: Transaction> Executor<T> for Order<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;
        let keys = rows
            .iter()
            .map(|row| {
                self.order_by
                    .iter()
                    .map(|(expr, _)| evaluate_expr(expr, &columns, row))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let directions = self.order_by.iter().map(|(_, d)| *d).collect::<Vec<_>>();
        Ok(ResultSet::Scan {
            rows: sort_rows(rows, keys, &directions)?,
            columns,
        })
    }
}

/// LIMIT executor - restricts the number of rows returned
pub struct Limit<T: Transaction> {
    source: Box<dyn Executor<T>>,
    limit: usize,
}

impl<T: Transaction> Limit<T> {
    pub fn new(source: Box<dyn Executor<T>>, limit: usize) -> Box<Self> {
        Box::new(Self { source, limit })
    }
}

impl<T: Transaction> Executor<T> for Limit<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;
        Ok(ResultSet::Scan {
            columns,
            rows: rows.into_iter().take(self.limit).collect(),
        })
    }
}

/// OFFSET executor - skips the first N rows
pub struct Offset<T: Transaction> {
    source: Box<dyn Executor<T>>,
    offset: usize,
}

impl<T: Transaction> Offset<T> {
    pub fn new(source: Box<dyn Executor<T>>, offset: usize) -> Box<Self> {
        Box::new(Self { source, offset })
    }
}

impl<T: Transaction> Executor<T> for Offset<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;
        Ok(ResultSet::Scan {
            columns,
            rows: rows.into_iter().skip(self.offset).collect(),
        })
    }
}

/// Literal rows: a FROM-less SELECT or a CTE working set
pub struct Values {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Values {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Box<Self> {
        Box::new(Self { columns, rows })
    }
}

impl<T: Transaction> Executor<T> for Values {
    fn execute(self: Box<Self>, _txn: &mut T) -> Result<ResultSet> {
        Ok(ResultSet::Scan {
            columns: self.columns,
            rows: self.rows,
        })
    }
}

/// Relabels a derived table so its columns read as `name.column`
pub struct Alias<T: Transaction> {
    source: Box<dyn Executor<T>>,
    name: String,
}

impl<T: Transaction> Alias<T> {
    pub fn new(source: Box<dyn Executor<T>>, name: String) -> Box<Self> {
        Box::new(Self { source, name })
    }
}

impl<T: Transaction> Executor<T> for Alias<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;
        let columns = columns
            .iter()
            .map(|c| format!("{}.{}", self.name, bare_name(c)))
            .collect::<Vec<_>>();
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].contains(c) {
                return Err(Error::Internal(format!(
                    "column {} is specified more than once in {}",
                    bare_name(c),
                    self.name
                )));
            }
        }
        Ok(ResultSet::Scan { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{bare_name, compare_keys, sort_rows};
    use crate::{
        error::Result,
        sql::{parser::ast::OrderDirection, types::Value},
    };

    #[test]
    fn test_sort_rows_is_stable_and_directional() -> Result<()> {
        let rows = vec![
            vec![Value::from("John Doe"), Value::from(30)],
            vec![Value::from("Mary Smith"), Value::from(25)],
            vec![Value::from("Adewale Ogun"), Value::from(30)],
        ];
        let keys = rows.iter().map(|r| vec![r[1].clone()]).collect();
        let sorted = sort_rows(rows, keys, &[OrderDirection::Desc])?;
        let names = sorted.iter().map(|r| r[0].to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["John Doe", "Adewale Ogun", "Mary Smith"]);
        Ok(())
    }

    #[test]
    fn test_compare_keys_nulls_first() -> Result<()> {
        let asc = [OrderDirection::Asc, OrderDirection::Desc];
        assert_eq!(
            compare_keys(&[Value::Null, Value::from(1)], &[Value::from(0.5), Value::from(1)], &asc)?,
            Ordering::Less
        );
        assert_eq!(
            compare_keys(&[Value::from(1), Value::from(1)], &[Value::from(1), Value::from(2)], &asc)?,
            Ordering::Greater
        );
        assert!(compare_keys(&[Value::from("a")], &[Value::from(1)], &asc).is_err());
        assert_eq!(bare_name("c.name"), "name");
        assert_eq!(bare_name("#agg0"), "#agg0");
        Ok(())
    }
}
