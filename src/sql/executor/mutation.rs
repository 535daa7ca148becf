use std::collections::{BTreeMap, HashMap};

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::ResultSet,
        parser::ast::{evaluate_const, evaluate_expr, Expression},
        schema::Table,
        types::{Row, Value},
    },
};

use super::Executor;

/// INSERT executor
pub struct Insert {
    table_name: String,
    columns: Vec<String>,
    values: Vec<Vec<Expression>>,
}

impl Insert {
    pub fn new(table_name: String, columns: Vec<String>, values: Vec<Vec<Expression>>) -> Box<Self> {
        Box::new(Self {
            table_name,
            columns,
            values,
        })
    }
}

// Positional insert: `insert into tbl values(1, 2, 3);` on (a, b, c, d)
// fills a, b, c and takes d from its default
fn pad_row(table: &Table, row: &Row) -> Result<Row> {
    if row.len() > table.columns.len() {
        return Err(Error::Internal(format!(
            "table {} has {} columns but {} values were given",
            table.name,
            table.columns.len(),
            row.len()
        )));
    }
    let mut results = row.clone();
    for column in table.columns.iter().skip(row.len()) {
        if let Some(default) = &column.default {
            results.push(default.clone());
        } else {
            return Err(Error::Internal(format!(
                "No default value for column {}",
                column.name
            )));
        }
    }
    Ok(results)
}

// Named insert: `insert into tbl(d, c) values(1, 2);` puts each value in
// its column and every other column takes its default
fn make_row(table: &Table, columns: &[String], values: &Row) -> Result<Row> {
    if columns.len() != values.len() {
        return Err(Error::Internal("columns and values num mismatch".into()));
    }

    let mut inputs = HashMap::new();
    for (i, col_name) in columns.iter().enumerate() {
        table.get_col_index(col_name)?;
        inputs.insert(col_name, values[i].clone());
    }

    let mut results = Vec::new();
    for col in table.columns.iter() {
        if let Some(value) = inputs.get(&col.name) {
            results.push(value.clone());
        } else if let Some(value) = &col.default {
            results.push(value.clone());
        } else {
            return Err(Error::Internal(format!(
                "No value given for the column {}",
                col.name
            )));
        }
    }

    Ok(results)
}

impl<T: Transaction> Executor<T> for Insert {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(self.table_name.clone())?;
        let mut count = 0;
        for exprs in self.values {
            let row = exprs
                .iter()
                .map(evaluate_const)
                .collect::<Result<Vec<_>>>()?;

            let insert_row = if self.columns.is_empty() {
                pad_row(&table, &row)?
            } else {
                make_row(&table, &self.columns, &row)?
            };
            let insert_row = insert_row
                .into_iter()
                .zip(&table.columns)
                .map(|(value, column)| value.coerce_to(column.datatype))
                .collect::<Row>();

            tracing::trace!(table = %self.table_name, row = ?insert_row, "insert row");
            txn.create_row(self.table_name.clone(), insert_row)?;
            count += 1;
        }
        Ok(ResultSet::Insert { count })
    }
}

/// UPDATE executor - rewrites every row produced by its scan
pub struct Update<T: Transaction> {
    table_name: String,
    source: Box<dyn Executor<T>>,
    columns: BTreeMap<String, Expression>,
}

impl<T: Transaction> Update<T> {
    pub fn new(
        table_name: String,
        source: Box<dyn Executor<T>>,
        columns: BTreeMap<String, Expression>,
    ) -> Box<Self> {
        Box::new(Self {
            table_name,
            source,
            columns,
        })
    }
}

impl<T: Transaction> Executor<T> for Update<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(self.table_name.clone())?;
        let (columns, rows) = self.source.execute(txn)?.into_rows()?;

        let mut count = 0;
        for row in rows {
            let id = table.get_primary_key(&row)?;
            let mut new_row = row.clone();
            for (col, expr) in &self.columns {
                let index = table.get_col_index(col)?;
                new_row[index] = evaluate_expr(expr, &columns, &row)?
                    .coerce_to(table.columns[index].datatype);
            }
            txn.update_row(&table, &id, new_row)?;
            count += 1;
        }
        Ok(ResultSet::Update { count })
    }
}

/// DELETE executor - removes every row produced by its scan
pub struct Delete<T: Transaction> {
    table_name: String,
    source: Box<dyn Executor<T>>,
}

impl<T: Transaction> Delete<T> {
    pub fn new(table_name: String, source: Box<dyn Executor<T>>) -> Box<Self> {
        Box::new(Self { table_name, source })
    }
}

impl<T: Transaction> Executor<T> for Delete<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(self.table_name.clone())?;
        let (_, rows) = self.source.execute(txn)?.into_rows()?;

        let mut count = 0;
        for row in rows {
            let id: Value = table.get_primary_key(&row)?;
            txn.delete_row(&table, &id)?;
            count += 1;
        }
        Ok(ResultSet::Delete { count })
    }
}
