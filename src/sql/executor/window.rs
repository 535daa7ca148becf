use std::{cmp::Ordering, collections::HashMap};

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{agg::calculate, query::compare_keys},
        parser::ast::{evaluate_expr, Expression, OrderDirection, WindowFunction},
        types::{Row, Value},
    },
};

use super::{Executor, ResultSet};

/// Window executor - appends one `#win{i}` column per window function.
///
/// Rows keep their input order. Ranking functions number rows within their
/// partition by the window ordering; aggregate windows cover the whole
/// partition, or with an ORDER BY every row up to the current row's last peer.
pub struct Window<T: Transaction> {
    source: Box<dyn Executor<T>>,
    functions: Vec<WindowFunction>,
}

impl<T: Transaction> Window<T> {
    pub fn new(source: Box<dyn Executor<T>>, functions: Vec<WindowFunction>) -> Box<Self> {
        Box::new(Self { source, functions })
    }
}

impl<T: Transaction> Executor<T> for Window<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (mut columns, rows) = self.source.execute(txn)?.into_rows()?;
        let mut computed: Vec<Row> = vec![Vec::with_capacity(self.functions.len()); rows.len()];

        for function in &self.functions {
            let directions = function.order_by.iter().map(|(_, d)| *d).collect::<Vec<_>>();
            for partition in partitions(&function.partition_by, &columns, &rows)? {
                txn.check_deadline()?;

                let mut sorted = Vec::with_capacity(partition.len());
                for i in partition {
                    let key = function
                        .order_by
                        .iter()
                        .map(|(expr, _)| evaluate_expr(expr, &columns, &rows[i]))
                        .collect::<Result<Vec<_>>>()?;
                    sorted.push((key, i));
                }
                let mut error = None;
                sorted.sort_by(|(k1, _), (k2, _)| {
                    compare_keys(k1, k2, &directions).unwrap_or_else(|e| {
                        error.get_or_insert(e);
                        Ordering::Equal
                    })
                });
                if let Some(e) = error {
                    return Err(e);
                }

                let values = compute(function, &sorted, &directions, &columns, &rows)?;
                for ((_, i), value) in sorted.iter().zip(values) {
                    computed[*i].push(value);
                }
            }
        }

        columns.extend((0..self.functions.len()).map(|i| format!("#win{}", i)));
        let rows = rows
            .into_iter()
            .zip(computed)
            .map(|(mut row, values)| {
                row.extend(values);
                row
            })
            .collect();
        Ok(ResultSet::Scan { columns, rows })
    }
}

/// Row indices grouped by partition key, in first-appearance order
fn partitions(partition_by: &[Expression], columns: &[String], rows: &[Row]) -> Result<Vec<Vec<usize>>> {
    let mut index: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut partitions: Vec<Vec<usize>> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let key = partition_by
            .iter()
            .map(|expr| evaluate_expr(expr, columns, row))
            .collect::<Result<Vec<_>>>()?;
        let id = bincode::serialize(&key)?;
        match index.get(&id) {
            Some(&p) => partitions[p].push(i),
            None => {
                index.insert(id, partitions.len());
                partitions.push(vec![i]);
            }
        }
    }
    Ok(partitions)
}

/// Values for one sorted partition, aligned with `sorted`
fn compute(
    function: &WindowFunction,
    sorted: &[(Vec<Value>, usize)],
    directions: &[OrderDirection],
    columns: &[String],
    rows: &[Row],
) -> Result<Vec<Value>> {
    let peers = |a: usize, b: usize| -> Result<bool> {
        Ok(compare_keys(&sorted[a].0, &sorted[b].0, directions)? == Ordering::Equal)
    };

    let mut values = Vec::with_capacity(sorted.len());
    match function.name.as_str() {
        "row_number" | "rank" | "dense_rank" => {
            if !function.args.is_empty() {
                return Err(Error::Internal(format!(
                    "{}() takes no arguments",
                    function.name
                )));
            }
            let (mut rank, mut dense) = (0, 0);
            for p in 0..sorted.len() {
                if p == 0 || !peers(p - 1, p)? {
                    rank = p as i64 + 1;
                    dense += 1;
                }
                values.push(Value::Integer(match function.name.as_str() {
                    "row_number" => p as i64 + 1,
                    "rank" => rank,
                    _ => dense,
                }));
            }
        }
        "count" | "sum" | "avg" | "min" | "max" => {
            let call = Expression::Function(function.name.clone(), function.args.clone());
            if function.order_by.is_empty() {
                let frame = sorted.iter().map(|(_, i)| &rows[*i]).collect::<Vec<_>>();
                let value = calculate(&call, columns, &frame)?;
                values.resize(sorted.len(), value);
            } else {
                for p in 0..sorted.len() {
                    let mut last = p;
                    while last + 1 < sorted.len() && peers(p, last + 1)? {
                        last += 1;
                    }
                    let frame = sorted[..=last]
                        .iter()
                        .map(|(_, i)| &rows[*i])
                        .collect::<Vec<_>>();
                    values.push(calculate(&call, columns, &frame)?);
                }
            }
        }
        name => {
            return Err(Error::Internal(format!(
                "unknown window function {}",
                name
            )))
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::compute;
    use crate::{
        error::Result,
        sql::{
            parser::ast::{Expression, OrderDirection, WindowFunction},
            types::Value,
        },
    };

    fn window(name: &str, args: Vec<Expression>) -> WindowFunction {
        WindowFunction {
            name: name.to_string(),
            args,
            partition_by: vec![],
            order_by: vec![(Expression::Field(None, "total".into()), OrderDirection::Desc)],
        }
    }

    #[test]
    fn test_ranking_with_ties() -> Result<()> {
        let columns = vec!["total".to_string()];
        let rows = vec![
            vec![Value::from(300.0)],
            vec![Value::from(200.0)],
            vec![Value::from(200.0)],
            vec![Value::from(100.0)],
        ];
        let sorted = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.clone(), i))
            .collect::<Vec<_>>();
        let desc = [OrderDirection::Desc];

        let ints = |v: Vec<i64>| v.into_iter().map(Value::from).collect::<Vec<_>>();
        assert_eq!(
            compute(&window("rank", vec![]), &sorted, &desc, &columns, &rows)?,
            ints(vec![1, 2, 2, 4])
        );
        assert_eq!(
            compute(&window("dense_rank", vec![]), &sorted, &desc, &columns, &rows)?,
            ints(vec![1, 2, 2, 3])
        );
        assert_eq!(
            compute(&window("row_number", vec![]), &sorted, &desc, &columns, &rows)?,
            ints(vec![1, 2, 3, 4])
        );
        // running sum includes every peer of the current row
        let total = vec![Expression::Field(None, "total".into())];
        assert_eq!(
            compute(&window("sum", total), &sorted, &desc, &columns, &rows)?,
            vec![
                Value::from(300.0),
                Value::from(700.0),
                Value::from(700.0),
                Value::from(800.0)
            ]
        );
        assert!(compute(&window("ntile", vec![]), &sorted, &desc, &columns, &rows).is_err());
        Ok(())
    }
}
