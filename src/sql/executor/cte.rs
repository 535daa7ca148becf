use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        parser::ast::SelectStatement,
        plan::{Planner, Scope},
    },
};

use super::{Executor, ResultSet};

/// `WITH RECURSIVE name AS (anchor UNION ALL step)`
///
/// The step is planned again on every iteration with `name` bound to the rows
/// the previous iteration produced, until it produces none. The result is the
/// anchor rows followed by every iteration's rows. Termination is up to the
/// query; the transaction deadline is checked before each iteration.
pub struct RecursiveCte<T: Transaction> {
    name: String,
    anchor: Box<dyn Executor<T>>,
    step: SelectStatement,
    scope: Scope,
}

impl<T: Transaction> RecursiveCte<T> {
    pub fn new(
        name: String,
        anchor: Box<dyn Executor<T>>,
        step: SelectStatement,
        scope: Scope,
    ) -> Box<Self> {
        Box::new(Self {
            name,
            anchor,
            step,
            scope,
        })
    }
}

impl<T: Transaction + 'static> Executor<T> for RecursiveCte<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (columns, anchor_rows) = self.anchor.execute(txn)?.into_rows()?;
        let mut rows = anchor_rows.clone();
        let mut working = anchor_rows;
        let mut iterations = 0usize;

        while !working.is_empty() {
            txn.check_deadline()?;
            iterations += 1;

            let mut scope = self.scope.clone();
            scope.bind_rows(&self.name, columns.clone(), working);
            let node = Planner::with_scope(scope).build_select(self.step.clone())?;
            let (step_columns, step_rows) = <dyn Executor<T>>::build(node).execute(txn)?.into_rows()?;
            if step_columns.len() != columns.len() {
                return Err(Error::Internal(format!(
                    "recursive step of {} returns {} columns, expected {}",
                    self.name,
                    step_columns.len(),
                    columns.len()
                )));
            }
            rows.extend(step_rows.iter().cloned());
            working = step_rows;
        }

        tracing::trace!(cte = %self.name, iterations, rows = rows.len(), "recursive cte done");
        Ok(ResultSet::Scan { columns, rows })
    }
}
