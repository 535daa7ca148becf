use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

use crate::{
    error::{Error, Result},
    sql::parser::ast::Expression,
};

use super::{executor::ResultSet, parser::Parser, plan::Plan, schema::Table, types::{Row, Value}};

mod kv;

pub use kv::{KVEngine, KVTransaction};

/// SQL engine trait
pub trait Engine: Clone {
    type Transaction: Transaction + 'static;

    fn begin(&self) -> Result<Self::Transaction>;

    fn session(&self) -> Result<Session<Self>> {
        Ok(Session {
            engine: self.clone(),
        })
    }
}

/// SQL transaction trait (DDL and DML operations)
///
/// Can be backed by KV storage or distributed storage.
/// Each SQL engine can have its own transaction type (e.g., 2PL, OCC).
pub trait Transaction {
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    /// Bounds how long statements in this transaction may run, starting now
    fn set_timeout(&mut self, limit: Duration);
    /// Fails with `Error::Timeout` once the bound set by `set_timeout` has
    /// passed. Executors call it at their loop boundaries.
    fn check_deadline(&self) -> Result<()>;

    /// Inserts a row, rejecting an existing primary key
    fn create_row(&mut self, table_name: String, row: Row) -> Result<()>;
    /// Updates a row, id is the primary key
    fn update_row(&mut self, table: &Table, id: &Value, row: Row) -> Result<()>;
    /// Deletes a row by primary key
    fn delete_row(&mut self, table: &Table, id: &Value) -> Result<()>;
    /// Scans table with optional filter, in primary key order
    fn scan_table(&self, table_name: String, filter: Option<Expression>) -> Result<Vec<Row>>;

    // DDL operations
    fn create_table(&mut self, table: Table) -> Result<()>;
    fn get_table(&self, table_name: String) -> Result<Option<Table>>;
    /// Returns table info, returns error if table doesn't exist
    fn must_get_table(&self, table_name: String) -> Result<Table> {
        self.get_table(table_name.clone())?
            .ok_or(Error::Internal(format!(
                "table {} does not exist",
                table_name
            )))
    }
}

/// SQL session for executing statements
pub struct Session<E: Engine> {
    engine: E,
}

impl<E: Engine + 'static> Session<E> {
    /// Executes a SQL statement in its own transaction
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        let stmt = Parser::new(sql).parse()?;
        let mut txn = self.engine.begin()?;
        match Plan::build(stmt)?.execute(&mut txn) {
            Ok(result) => {
                txn.commit()?;
                Ok(result)
            }
            Err(err) => {
                txn.rollback()?;
                Err(err)
            }
        }
    }

    /// Executes statements in one transaction: all of them commit or none do
    pub fn execute_batch<S: AsRef<str>>(&mut self, statements: &[S]) -> Result<Vec<ResultSet>> {
        let mut txn = self.engine.begin()?;
        let mut results = Vec::with_capacity(statements.len());
        for sql in statements {
            let result = Parser::new(sql.as_ref())
                .parse()
                .and_then(Plan::build)
                .and_then(|plan| plan.execute(&mut txn));
            match result {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::debug!(sql = sql.as_ref(), %err, "batch statement failed, rolling back");
                    txn.rollback()?;
                    return Err(err);
                }
            }
        }
        txn.commit()?;
        Ok(results)
    }

    /// Runs a statement against a snapshot that is always rolled back, so
    /// nothing it writes is ever visible to later statements.
    pub fn query_snapshot(&mut self, sql: &str, timeout: Option<Duration>) -> Result<ResultSet> {
        let plan = Plan::build(Parser::new(sql).parse()?)?;
        let mut txn = SnapshotGuard {
            txn: self.engine.begin()?,
        };
        if let Some(limit) = timeout {
            txn.set_timeout(limit);
        }
        plan.execute(&mut *txn)
    }
}

/// Rolls its transaction back when dropped, on every path out of a snapshot
struct SnapshotGuard<T: Transaction> {
    txn: T,
}

impl<T: Transaction> Deref for SnapshotGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.txn
    }
}

impl<T: Transaction> DerefMut for SnapshotGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.txn
    }
}

impl<T: Transaction> Drop for SnapshotGuard<T> {
    fn drop(&mut self) {
        if let Err(err) = self.txn.rollback() {
            tracing::warn!(%err, "failed to roll back snapshot transaction");
        }
    }
}
