use std::{cmp::Ordering, collections::HashMap};

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        parser::ast::{evaluate_expr, resolve_column, Expression},
        types::{Row, Value},
    },
};

use super::{Executor, ResultSet};

/// Aggregate executor - computes aggregate functions (COUNT, SUM, MIN, MAX, AVG)
///
/// Output columns are the group expressions followed by `#agg{i}` per
/// aggregate. A grouped column keeps its source label (`c.country`) so it
/// can still be referenced by name; other group expressions become `#grp{i}`.
/// Groups come out in the order they first appear in the input.
pub struct Aggregate<T: Transaction> {
    source: Box<dyn Executor<T>>,
    group_by: Vec<Expression>,
    aggregates: Vec<Expression>,
}

impl<T: Transaction> Aggregate<T> {
    pub fn new(
        source: Box<dyn Executor<T>>,
        group_by: Vec<Expression>,
        aggregates: Vec<Expression>,
    ) -> Box<Self> {
        Box::new(Self {
            source,
            group_by,
            aggregates,
        })
    }
}

impl<T: Transaction> Executor<T> for Aggregate<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;

        let mut new_cols = Vec::new();
        for (i, expr) in self.group_by.iter().enumerate() {
            new_cols.push(match expr {
                Expression::Field(table, name) => {
                    columns[resolve_column(&columns, table.as_deref(), name)?].clone()
                }
                _ => format!("#grp{}", i),
            });
        }
        new_cols.extend((0..self.aggregates.len()).map(|i| format!("#agg{}", i)));

        let mut index: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut groups: Vec<(Row, Vec<&Row>)> = Vec::new();
        for row in &rows {
            let key = self
                .group_by
                .iter()
                .map(|expr| evaluate_expr(expr, &columns, row))
                .collect::<Result<Row>>()?;
            let id = bincode::serialize(&key)?;
            match index.get(&id) {
                Some(&i) => groups[i].1.push(row),
                None => {
                    index.insert(id, groups.len());
                    groups.push((key, vec![row]));
                }
            }
        }
        // Without GROUP BY an empty input is still one (empty) group
        if groups.is_empty() && self.group_by.is_empty() {
            groups.push((Vec::new(), Vec::new()));
        }

        let mut new_rows = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut row = key;
            for agg in &self.aggregates {
                row.push(calculate(agg, &columns, &members)?);
            }
            new_rows.push(row);
        }
        Ok(ResultSet::Scan {
            columns: new_cols,
            rows: new_rows,
        })
    }
}

/// Evaluates one aggregate call over `rows`
pub(super) fn calculate(agg: &Expression, cols: &[String], rows: &[&Row]) -> Result<Value> {
    match agg {
        Expression::Function(name, args) => <dyn Calculator>::build(name)?.calc(args, cols, rows),
        other => Err(Error::Internal(format!("{} is not an aggregate", other))),
    }
}

/// Trait for aggregate function calculations
pub trait Calculator {
    fn calc(&self, args: &[Expression], cols: &[String], rows: &[&Row]) -> Result<Value>;
}

impl dyn Calculator {
    /// Runtime dispatch to appropriate calculator based on function name
    pub fn build(func_name: &str) -> Result<Box<dyn Calculator>> {
        Ok(match func_name.to_uppercase().as_ref() {
            "COUNT" => Count::new(),
            "SUM" => Sum::new(),
            "MIN" => Min::new(),
            "MAX" => Max::new(),
            "AVG" => Avg::new(),
            _ => {
                return Err(Error::Internal(format!(
                    "unknown aggregate function {}",
                    func_name
                )))
            }
        })
    }
}

/// Non-null values of the single argument over all rows
fn values(args: &[Expression], cols: &[String], rows: &[&Row]) -> Result<Vec<Value>> {
    let [arg] = args else {
        return Err(Error::Internal(format!(
            "aggregate expects one argument, got {}",
            args.len()
        )));
    };
    let mut values = Vec::new();
    for row in rows {
        let value = evaluate_expr(arg, cols, row)?;
        if !value.is_null() {
            values.push(value);
        }
    }
    Ok(values)
}

/// COUNT(*) counts rows, COUNT(e) counts non-null values
pub struct Count;

impl Count {
    fn new() -> Box<Self> {
        Box::new(Self {})
    }
}

impl Calculator for Count {
    fn calc(&self, args: &[Expression], cols: &[String], rows: &[&Row]) -> Result<Value> {
        let count = if args.is_empty() {
            rows.len()
        } else {
            values(args, cols, rows)?.len()
        };
        Ok(Value::Integer(count as i64))
    }
}

/// MIN - finds minimum value in a column
pub struct Min;

impl Min {
    fn new() -> Box<Self> {
        Box::new(Self {})
    }
}

impl Calculator for Min {
    fn calc(&self, args: &[Expression], cols: &[String], rows: &[&Row]) -> Result<Value> {
        extreme(values(args, cols, rows)?, Ordering::Less)
    }
}

/// MAX - finds maximum value in a column
pub struct Max;

impl Max {
    fn new() -> Box<Self> {
        Box::new(Self {})
    }
}

impl Calculator for Max {
    fn calc(&self, args: &[Expression], cols: &[String], rows: &[&Row]) -> Result<Value> {
        extreme(values(args, cols, rows)?, Ordering::Greater)
    }
}

fn extreme(values: Vec<Value>, wanted: Ordering) -> Result<Value> {
    let mut best = Value::Null;
    for value in values {
        if best.is_null() || value.sort_cmp(&best)? == wanted {
            best = value;
        }
    }
    Ok(best)
}

/// SUM - integer sum for integer input, float otherwise; NULL when empty
pub struct Sum;

impl Sum {
    fn new() -> Box<Self> {
        Box::new(Self {})
    }
}

impl Calculator for Sum {
    fn calc(&self, args: &[Expression], cols: &[String], rows: &[&Row]) -> Result<Value> {
        let mut sum = Value::Null;
        for value in values(args, cols, rows)? {
            if value.as_f64().is_none() {
                return Err(Error::Internal(format!("can not sum value {}", value)));
            }
            sum = match sum {
                Value::Null => value,
                s => s.checked_add(&value)?,
            };
        }
        Ok(sum)
    }
}

/// AVG - calculates average of values in a column
pub struct Avg;

impl Avg {
    fn new() -> Box<Self> {
        Box::new(Self {})
    }
}

impl Calculator for Avg {
    fn calc(&self, args: &[Expression], cols: &[String], rows: &[&Row]) -> Result<Value> {
        // AVG = SUM / COUNT
        let sum = Sum::new().calc(args, cols, rows)?;
        let count = Count::new().calc(args, cols, rows)?;
        Ok(match (sum.as_f64(), count) {
            (Some(s), Value::Integer(c)) if c > 0 => Value::Float(s / c as f64),
            _ => Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::calculate;
    use crate::{
        error::Result,
        sql::{
            parser::ast::Expression,
            types::{Row, Value},
        },
    };

    fn call(name: &str, column: Option<&str>) -> Expression {
        Expression::Function(
            name.to_string(),
            column
                .map(|c| vec![Expression::Field(None, c.to_string())])
                .unwrap_or_default(),
        )
    }

    #[test]
    fn test_aggregates_skip_nulls() -> Result<()> {
        let cols = vec!["o.order_id".to_string(), "o.amount".to_string()];
        let rows: Vec<Row> = vec![
            vec![Value::from(1), Value::from(250.0)],
            vec![Value::from(3), Value::Null],
            vec![Value::from(6), Value::from(75.25)],
        ];
        let refs = rows.iter().collect::<Vec<_>>();

        assert_eq!(calculate(&call("count", None), &cols, &refs)?, Value::from(3));
        assert_eq!(calculate(&call("count", Some("amount")), &cols, &refs)?, Value::from(2));
        assert_eq!(calculate(&call("sum", Some("amount")), &cols, &refs)?, Value::from(325.25));
        assert_eq!(calculate(&call("avg", Some("amount")), &cols, &refs)?, Value::from(162.625));
        assert_eq!(calculate(&call("min", Some("order_id")), &cols, &refs)?, Value::from(1));
        assert_eq!(calculate(&call("max", Some("amount")), &cols, &refs)?, Value::from(250.0));
        assert_eq!(calculate(&call("sum", Some("order_id")), &cols, &refs)?, Value::from(10));
        Ok(())
    }

    #[test]
    fn test_aggregates_over_no_rows() -> Result<()> {
        let cols = vec!["age".to_string()];
        assert_eq!(calculate(&call("count", None), &cols, &[])?, Value::from(0));
        assert_eq!(calculate(&call("sum", Some("age")), &cols, &[])?, Value::Null);
        assert_eq!(calculate(&call("avg", Some("age")), &cols, &[])?, Value::Null);
        assert!(calculate(&call("median", Some("age")), &cols, &[]).is_err());
        Ok(())
    }
}
