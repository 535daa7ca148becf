use crate::{
    error::Result,
    sql::{
        engine::Transaction,
        executor::is_true,
        parser::ast::{evaluate_expr, Expression, JoinType},
        types::{Row, Value},
    },
};

use super::{Executor, ResultSet};

/// Nested Loop Join executor
///
/// Without a predicate this is the Cartesian product. LEFT keeps unmatched
/// left rows padded with NULLs, RIGHT does the same for right rows; output
/// columns are always left columns followed by right columns.
pub struct NestedLoopJoin<T: Transaction> {
    left: Box<dyn Executor<T>>,
    right: Box<dyn Executor<T>>,
    predicate: Option<Expression>,
    join_type: JoinType,
}

impl<T: Transaction> NestedLoopJoin<T> {
    pub fn new(
        left: Box<dyn Executor<T>>,
        right: Box<dyn Executor<T>>,
        predicate: Option<Expression>,
        join_type: JoinType,
    ) -> Box<Self> {
        Box::new(Self {
            left,
            right,
            predicate,
            join_type,
        })
    }
}

impl<T: Transaction> Executor<T> for NestedLoopJoin<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let (lcols, lrows) = self.left.execute(txn)?.into_rows()?;
        let (rcols, rrows) = self.right.execute(txn)?.into_rows()?;

        let mut columns = lcols.clone();
        columns.extend(rcols.iter().cloned());

        let join_row = |lrow: &Row, rrow: &Row| -> Result<Option<Row>> {
            let mut row = lrow.clone();
            row.extend(rrow.iter().cloned());
            match &self.predicate {
                Some(expr) if !is_true(evaluate_expr(expr, &columns, &row)?)? => Ok(None),
                _ => Ok(Some(row)),
            }
        };

        let mut rows = Vec::new();
        if self.join_type == JoinType::Right {
            // Right rows drive the loop so unmatched ones can be padded
            for rrow in &rrows {
                txn.check_deadline()?;
                let mut matched = false;
                for lrow in &lrows {
                    if let Some(row) = join_row(lrow, rrow)? {
                        rows.push(row);
                        matched = true;
                    }
                }
                if !matched {
                    let mut row = vec![Value::Null; lcols.len()];
                    row.extend(rrow.iter().cloned());
                    rows.push(row);
                }
            }
        } else {
            for lrow in &lrows {
                txn.check_deadline()?;
                let mut matched = false;
                for rrow in &rrows {
                    if let Some(row) = join_row(lrow, rrow)? {
                        rows.push(row);
                        matched = true;
                    }
                }
                if self.join_type == JoinType::Left && !matched {
                    let mut row = lrow.clone();
                    row.extend(std::iter::repeat_n(Value::Null, rcols.len()));
                    rows.push(row);
                }
            }
        }

        Ok(ResultSet::Scan { columns, rows })
    }
}
