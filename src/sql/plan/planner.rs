use crate::{
    error::{Error, Result},
    sql::{
        parser::ast::{self, evaluate_const, Expression},
        plan::{Cte, Node, Plan, Scope},
        schema::{self, Table},
        types::Value,
    },
};

/// Query planner - converts AST into execution plan nodes
#[derive(Default)]
pub struct Planner {
    scope: Scope,
}

impl Planner {
    pub fn new() -> Self {
        Self::with_scope(Scope::default())
    }

    /// Planner that resolves table names against `scope` before the catalog
    pub fn with_scope(scope: Scope) -> Self {
        Self { scope }
    }

    /// Builds an execution plan from an AST statement
    pub fn build(&mut self, stmt: ast::Statement) -> Result<Plan> {
        Ok(Plan(self.build_statement(stmt)?))
    }

    pub fn build_statement(&self, stmt: ast::Statement) -> Result<Node> {
        Ok(match stmt {
            ast::Statement::CreateTable { name, columns } => Node::CreateTable {
                schema: Table {
                    name,
                    columns: columns
                        .into_iter()
                        .map(|c| {
                            let nullable = c.nullable.unwrap_or(!c.primary_key);
                            let default = match c.default {
                                Some(expr) => Some(evaluate_const(&expr)?.coerce_to(c.datatype)),
                                None if nullable => Some(Value::Null),
                                None => None,
                            };

                            Ok(schema::Column {
                                name: c.name,
                                datatype: c.datatype,
                                nullable,
                                default,
                                primary_key: c.primary_key,
                            })
                        })
                        .collect::<Result<_>>()?,
                },
            },
            ast::Statement::Insert {
                table_name,
                columns,
                values,
            } => Node::Insert {
                table_name,
                columns: columns.unwrap_or_default(),
                values,
            },
            ast::Statement::Select(select) => self.build_select(*select)?,
            ast::Statement::Update {
                table_name,
                columns,
                where_clause,
            } => Node::Update {
                table_name: table_name.clone(),
                source: Box::new(Node::Scan {
                    table_name,
                    alias: None,
                    filter: where_clause,
                }),
                columns,
            },
            ast::Statement::Delete {
                table_name,
                where_clause,
            } => Node::Delete {
                table_name: table_name.clone(),
                source: Box::new(Node::Scan {
                    table_name,
                    alias: None,
                    filter: where_clause,
                }),
            },
        })
    }

    /// Plans a SELECT as FROM → WHERE → aggregate → HAVING → window →
    /// ORDER BY → OFFSET → LIMIT → projection.
    ///
    /// Aggregate and window calls are computed by their own nodes into
    /// hidden `#agg{i}` / `#win{i}` columns, and the expressions above them
    /// are rewritten to read those columns.
    pub fn build_select(&self, select: ast::SelectStatement) -> Result<Node> {
        let ast::SelectStatement {
            with,
            select,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        } = select;

        let mut scope = self.scope.clone();
        for cte in with {
            let binding = match cte.recursive_step {
                Some(step) => Cte::Recursive {
                    anchor: Box::new(cte.query),
                    step: Box::new(step),
                    scope: scope.clone(),
                },
                None => Cte::Query {
                    query: Box::new(cte.query),
                    scope: scope.clone(),
                },
            };
            scope.bind(cte.name, binding);
        }
        let planner = Planner::with_scope(scope);

        let mut node = match from {
            Some(item) => planner.build_from_item(item)?,
            None => Node::Values {
                columns: Vec::new(),
                rows: vec![Vec::new()],
            },
        };

        if let Some(predicate) = where_clause {
            node = Node::Filter {
                source: Box::new(node),
                predicate,
            };
        }

        // ORDER BY may name a select alias
        let mut order_by = order_by
            .into_iter()
            .map(|(expr, direction)| {
                let aliased = match &expr {
                    Expression::Field(None, name) => select
                        .iter()
                        .find(|(_, alias)| alias.as_deref() == Some(name.as_str()))
                        .map(|(aliased, _)| aliased.clone()),
                    _ => None,
                };
                (aliased.unwrap_or(expr), direction)
            })
            .collect::<Vec<_>>();

        // Output names come from the expressions as written
        let mut select = select
            .into_iter()
            .map(|(expr, alias)| {
                let name = alias.unwrap_or_else(|| expr.column_name());
                (expr, Some(name))
            })
            .collect::<Vec<_>>();
        let mut having = having;

        let mut aggregates = Vec::new();
        for (expr, _) in &select {
            expr.collect(&Expression::is_aggregate, &mut aggregates);
        }
        if let Some(expr) = &having {
            expr.collect(&Expression::is_aggregate, &mut aggregates);
        }
        for (expr, _) in &order_by {
            expr.collect(&Expression::is_aggregate, &mut aggregates);
        }

        if !group_by.is_empty() || !aggregates.is_empty() {
            for agg in &aggregates {
                if let Expression::Function(name, args) = agg {
                    if args.iter().any(|a| a.contains(&Expression::is_aggregate)) {
                        return Err(Error::Internal(format!(
                            "aggregate function calls cannot be nested in {}",
                            name
                        )));
                    }
                }
            }
            let rewrite = |expr: &Expression| {
                if let Some(i) = aggregates.iter().position(|a| a == expr) {
                    return Some(Expression::Field(None, format!("#agg{}", i)));
                }
                match expr {
                    Expression::Field(..) => None,
                    _ => group_by
                        .iter()
                        .position(|g| g == expr)
                        .map(|i| Expression::Field(None, format!("#grp{}", i))),
                }
            };
            select = select
                .into_iter()
                .map(|(expr, alias)| (expr.replace(&rewrite), alias))
                .collect();
            having = having.map(|expr| expr.replace(&rewrite));
            order_by = order_by
                .into_iter()
                .map(|(expr, direction)| (expr.replace(&rewrite), direction))
                .collect();

            node = Node::Aggregate {
                source: Box::new(node),
                group_by,
                aggregates,
            };
        }

        if let Some(predicate) = having {
            node = Node::Filter {
                source: Box::new(node),
                predicate,
            };
        }

        let is_window = |expr: &Expression| matches!(expr, Expression::Window(_));
        let mut windows = Vec::new();
        for (expr, _) in &select {
            expr.collect(&is_window, &mut windows);
        }
        for (expr, _) in &order_by {
            expr.collect(&is_window, &mut windows);
        }
        if !windows.is_empty() {
            let rewrite = |expr: &Expression| {
                windows
                    .iter()
                    .position(|w| w == expr)
                    .map(|i| Expression::Field(None, format!("#win{}", i)))
            };
            select = select
                .into_iter()
                .map(|(expr, alias)| (expr.replace(&rewrite), alias))
                .collect();
            order_by = order_by
                .into_iter()
                .map(|(expr, direction)| (expr.replace(&rewrite), direction))
                .collect();

            node = Node::Window {
                source: Box::new(node),
                functions: windows
                    .into_iter()
                    .filter_map(|expr| match expr {
                        Expression::Window(function) => Some(*function),
                        _ => None,
                    })
                    .collect(),
            };
        }

        if !order_by.is_empty() {
            node = Node::Order {
                source: Box::new(node),
                order_by,
            };
        }

        // OFFSET - must be processed before LIMIT when both are present
        if let Some(expr) = offset {
            node = Node::Offset {
                source: Box::new(node),
                offset: row_count(&expr, "offset")?,
            }
        }

        if let Some(expr) = limit {
            node = Node::Limit {
                source: Box::new(node),
                limit: row_count(&expr, "limit")?,
            }
        }

        Ok(Node::Projection {
            source: Box::new(node),
            exprs: select,
        })
    }

    fn build_from_item(&self, item: ast::FromItem) -> Result<Node> {
        Ok(match item {
            ast::FromItem::Table { name, alias } => match self.scope.get(&name) {
                Some(cte) => {
                    let source = self.build_cte(&name, cte.clone())?;
                    Node::Alias {
                        source: Box::new(source),
                        name: alias.unwrap_or(name),
                    }
                }
                None => Node::Scan {
                    table_name: name,
                    alias,
                    filter: None,
                },
            },
            ast::FromItem::Join {
                left,
                right,
                join_type,
                predicate,
            } => Node::NestedLoopJoin {
                // Recursively build join nodes (base case: single table)
                left: Box::new(self.build_from_item(*left)?),
                right: Box::new(self.build_from_item(*right)?),
                predicate,
                join_type,
            },
        })
    }

    fn build_cte(&self, name: &str, cte: Cte) -> Result<Node> {
        Ok(match cte {
            Cte::Query { query, scope } => Planner::with_scope(scope).build_select(*query)?,
            Cte::Recursive {
                anchor,
                step,
                scope,
            } => Node::RecursiveCte {
                name: name.to_string(),
                anchor: Box::new(Planner::with_scope(scope.clone()).build_select(*anchor)?),
                step,
                scope,
            },
            Cte::Rows { columns, rows } => Node::Values { columns, rows },
        })
    }
}

fn row_count(expr: &Expression, clause: &str) -> Result<usize> {
    match evaluate_const(expr)? {
        Value::Integer(i) if i >= 0 => Ok(i as usize),
        v => Err(Error::Internal(format!("invalid {} {}", clause, v))),
    }
}
