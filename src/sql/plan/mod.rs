use std::collections::{BTreeMap, HashMap};

use crate::{
    error::Result,
    sql::{
        engine::Transaction,
        executor::{Executor, ResultSet},
        parser::ast::{self, Expression, JoinType, OrderDirection, WindowFunction},
        schema::Table,
        types::Row,
    },
};

mod planner;

pub use planner::Planner;

/// Execution plan node
#[derive(Debug, Clone)]
pub enum Node {
    CreateTable {
        schema: Table,
    },
    Insert {
        table_name: String,
        columns: Vec<String>,
        values: Vec<Vec<Expression>>,
    },
    /// Reads a table; columns are labelled `alias.column`
    Scan {
        table_name: String,
        alias: Option<String>,
        filter: Option<Expression>,
    },
    Update {
        table_name: String,
        source: Box<Node>,
        columns: BTreeMap<String, Expression>,
    },
    Delete {
        table_name: String,
        source: Box<Node>,
    },
    Filter {
        source: Box<Node>,
        predicate: Expression,
    },
    /// Empty `exprs` selects every visible source column
    Projection {
        source: Box<Node>,
        exprs: Vec<(Expression, Option<String>)>,
    },
    Order {
        source: Box<Node>,
        order_by: Vec<(Expression, OrderDirection)>,
    },
    Limit {
        source: Box<Node>,
        limit: usize,
    },
    Offset {
        source: Box<Node>,
        offset: usize,
    },
    NestedLoopJoin {
        left: Box<Node>,
        right: Box<Node>,
        predicate: Option<Expression>,
        join_type: JoinType,
    },
    /// Emits one row per group: group values, then one column per aggregate
    Aggregate {
        source: Box<Node>,
        group_by: Vec<Expression>,
        aggregates: Vec<Expression>,
    },
    /// Appends one column per window function
    Window {
        source: Box<Node>,
        functions: Vec<WindowFunction>,
    },
    Values {
        columns: Vec<String>,
        rows: Vec<Row>,
    },
    /// Requalifies every source column with a new table name
    Alias {
        source: Box<Node>,
        name: String,
    },
    /// `WITH RECURSIVE name AS (anchor UNION ALL step)`
    RecursiveCte {
        name: String,
        anchor: Box<Node>,
        step: Box<ast::SelectStatement>,
        scope: Scope,
    },
}

/// Common table expressions visible while planning a query
#[derive(Debug, Clone, Default)]
pub struct Scope {
    ctes: HashMap<String, Cte>,
}

#[derive(Debug, Clone)]
enum Cte {
    /// Planned again at every reference, in the scope it was defined in
    Query {
        query: Box<ast::SelectStatement>,
        scope: Scope,
    },
    Recursive {
        anchor: Box<ast::SelectStatement>,
        step: Box<ast::SelectStatement>,
        scope: Scope,
    },
    /// Materialized rows, the working set of a recursive step
    Rows { columns: Vec<String>, rows: Vec<Row> },
}

impl Scope {
    /// Binds `name` to already computed rows
    pub fn bind_rows(&mut self, name: &str, columns: Vec<String>, rows: Vec<Row>) {
        self.ctes
            .insert(name.to_string(), Cte::Rows { columns, rows });
    }

    fn get(&self, name: &str) -> Option<&Cte> {
        self.ctes.get(name)
    }

    fn bind(&mut self, name: String, cte: Cte) {
        self.ctes.insert(name, cte);
    }
}

/// Execution plan (root node of the plan tree)
#[derive(Debug)]
pub struct Plan(pub Node);

impl Plan {
    /// Builds an execution plan from an AST statement
    pub fn build(stmt: ast::Statement) -> Result<Self> {
        Planner::new().build(stmt)
    }

    /// Executes the plan within the given transaction
    pub fn execute<T: Transaction + 'static>(self, txn: &mut T) -> Result<ResultSet> {
        <dyn Executor<T>>::build(self.0).execute(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, Plan};
    use crate::{
        error::Result,
        sql::parser::{ast::JoinType, Parser},
    };

    fn plan(sql: &str) -> Result<Node> {
        Ok(Plan::build(Parser::new(sql).parse()?)?.0)
    }

    #[test]
    fn test_plan_select_pipeline() -> Result<()> {
        let node = plan(
            "select country, count(*) from customers where age > 20
             group by country having count(*) > 1 order by country limit 1;",
        )?;
        let Node::Projection { source, exprs } = node else {
            panic!("expected projection");
        };
        assert_eq!(exprs.len(), 2);
        let Node::Limit { source, limit: 1 } = *source else {
            panic!("expected limit");
        };
        let Node::Order { source, .. } = *source else {
            panic!("expected order");
        };
        let Node::Filter { source, .. } = *source else {
            panic!("expected having filter");
        };
        let Node::Aggregate {
            source,
            group_by,
            aggregates,
        } = *source
        else {
            panic!("expected aggregate");
        };
        assert_eq!(group_by.len(), 1);
        // count(*) in the select list and in HAVING is computed once
        assert_eq!(aggregates.len(), 1);
        assert!(matches!(*source, Node::Filter { .. }));
        Ok(())
    }

    #[test]
    fn test_plan_join_and_cte() -> Result<()> {
        let node = plan(
            "with big as (select customer_id from orders where amount > 100)
             select c.name from customers c right join big b on c.customer_id = b.customer_id;",
        )?;
        let Node::Projection { source, .. } = node else {
            panic!("expected projection");
        };
        let Node::NestedLoopJoin {
            left,
            right,
            join_type,
            ..
        } = *source
        else {
            panic!("expected join");
        };
        assert_eq!(join_type, JoinType::Right);
        assert!(matches!(*left, Node::Scan { alias: Some(ref a), .. } if a == "c"));
        assert!(matches!(*right, Node::Alias { ref name, .. } if name == "b"));
        Ok(())
    }

    #[test]
    fn test_plan_recursive_cte() -> Result<()> {
        let node = plan(
            "with recursive n as (select 1 as i union all select i + 1 from n where i < 3)
             select i from n;",
        )?;
        let Node::Projection { source, .. } = node else {
            panic!("expected projection");
        };
        assert!(matches!(*source, Node::Alias { ref source, .. } if matches!(**source, Node::RecursiveCte { .. })));
        Ok(())
    }
}
