use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{
            agg::Aggregate,
            cte::RecursiveCte,
            join::NestedLoopJoin,
            mutation::{Delete, Insert, Update},
            query::{Alias, Filter, Limit, Offset, Order, Projection, Scan, Values},
            schema::CreateTable,
            window::Window,
        },
        plan::Node,
        types::{Row, Value},
    },
};

mod agg;
mod cte;
mod join;
mod mutation;
mod query;
mod schema;
mod window;

/// SQL executor trait
pub trait Executor<T: Transaction> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet>;
}

/// Builds an executor from a plan node
///
/// The `'static` bound is required for trait object usage in recursive executor building.
impl<T: Transaction + 'static> dyn Executor<T> {
    pub fn build(node: Node) -> Box<dyn Executor<T>> {
        match node {
            Node::CreateTable { schema } => CreateTable::new(schema),
            Node::Insert {
                table_name,
                columns,
                values,
            } => Insert::new(table_name, columns, values),
            Node::Scan {
                table_name,
                alias,
                filter,
            } => Scan::new(table_name, alias, filter),
            Node::Update {
                table_name,
                source,
                columns,
            } => Update::new(
                table_name,
                // Recursively build inner node (Scan node from planner.rs)
                Self::build(*source),
                columns,
            ),
            Node::Delete { table_name, source } => Delete::new(table_name, Self::build(*source)),
            Node::Filter { source, predicate } => Filter::new(Self::build(*source), predicate),
            Node::Projection { source, exprs } => Projection::new(Self::build(*source), exprs),
            Node::Order { source, order_by } => Order::new(Self::build(*source), order_by),
            Node::Limit { source, limit } => Limit::new(Self::build(*source), limit),
            Node::Offset { source, offset } => Offset::new(Self::build(*source), offset),
            Node::NestedLoopJoin {
                left,
                right,
                predicate,
                join_type,
            } => NestedLoopJoin::new(Self::build(*left), Self::build(*right), predicate, join_type),
            Node::Aggregate {
                source,
                group_by,
                aggregates,
            } => Aggregate::new(Self::build(*source), group_by, aggregates),
            Node::Window { source, functions } => Window::new(Self::build(*source), functions),
            Node::Values { columns, rows } => Values::new(columns, rows),
            Node::Alias { source, name } => Alias::new(Self::build(*source), name),
            Node::RecursiveCte {
                name,
                anchor,
                step,
                scope,
            } => RecursiveCte::new(name, Self::build(*anchor), *step, scope),
        }
    }
}

/// Execution result set
#[derive(Debug, PartialEq)]
pub enum ResultSet {
    CreateTable { table_name: String },
    Insert { count: usize },
    Scan { columns: Vec<String>, rows: Vec<Row> },
    Update { count: usize },
    Delete { count: usize },
}

impl ResultSet {
    /// Column labels and rows of a query result
    pub fn into_rows(self) -> Result<(Vec<String>, Vec<Row>)> {
        match self {
            ResultSet::Scan { columns, rows } => Ok((columns, rows)),
            other => Err(Error::Internal(format!(
                "Unexpected result set {:?}",
                other
            ))),
        }
    }
}

/// Whether a WHERE / HAVING / ON result keeps the row; FALSE and NULL both drop it
pub(crate) fn is_true(value: Value) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        v => Err(Error::Internal(format!(
            "predicate evaluated to non-boolean {}",
            v
        ))),
    }
}
