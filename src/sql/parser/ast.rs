use std::{collections::BTreeMap, fmt::Display};

use crate::{
    error::{Error, Result},
    sql::types::{DataType, Value},
};

/// Abstract Syntax Tree (AST) node definitions for SQL statements
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// CREATE TABLE statement
    CreateTable { name: String, columns: Vec<Column> },
    /// INSERT statement
    Insert {
        table_name: String,
        columns: Option<Vec<String>>,
        values: Vec<Vec<Expression>>,
    },
    /// SELECT statement, optionally preceded by WITH
    Select(Box<SelectStatement>),
    /// UPDATE statement
    Update {
        table_name: String,
        columns: BTreeMap<String, Expression>,
        where_clause: Option<Expression>,
    },
    /// DELETE statement
    Delete {
        table_name: String,
        where_clause: Option<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub with: Vec<CommonTableExpr>,
    /// Column expressions with optional aliases, empty for `SELECT *`
    pub select: Vec<(Expression, Option<String>)>,
    /// None for a FROM-less select, which yields a single row
    pub from: Option<FromItem>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<(Expression, OrderDirection)>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
}

/// `name AS (query)`, or for `WITH RECURSIVE` `name AS (anchor UNION ALL step)`
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    pub name: String,
    pub query: SelectStatement,
    pub recursive_step: Option<SelectStatement>,
}

/// FROM clause item - represents a table or join expression
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    /// Table or CTE reference
    Table { name: String, alias: Option<String> },

    /// Join expression (two tables joined together)
    Join {
        left: Box<FromItem>,
        right: Box<FromItem>,
        join_type: JoinType,
        /// Join ON condition (None for CROSS JOIN)
        predicate: Option<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
}

/// Sort direction (ascending or descending)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// Column definition for CREATE TABLE statements
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: Option<bool>,
    pub default: Option<Expression>,
    pub primary_key: bool,
}

/// Expression types (column refs, constants, operations, function calls)
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Column reference, optionally qualified by table or alias
    Field(Option<String>, String),
    /// Constant value
    Consts(Consts),
    /// Unary and binary operations
    Operation(Operation),
    /// Scalar or aggregate function call, lower-cased name.
    /// `COUNT(*)` is a count with no arguments.
    Function(String, Vec<Expression>),
    /// Window function call: `name(args) OVER (PARTITION BY .. ORDER BY ..)`
    Window(Box<WindowFunction>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunction {
    pub name: String,
    pub args: Vec<Expression>,
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<(Expression, OrderDirection)>,
}

/// Implements From trait to convert Consts into Expression
impl From<Consts> for Expression {
    fn from(value: Consts) -> Self {
        Self::Consts(value)
    }
}

impl From<Operation> for Expression {
    fn from(value: Operation) -> Self {
        Self::Operation(value)
    }
}

/// Constant values in SQL expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Consts {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),

    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    LessThan(Box<Expression>, Box<Expression>),
    LessThanOrEqual(Box<Expression>, Box<Expression>),
    IsNull(Box<Expression>),

    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Modulo(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
}

const AGGREGATES: [&str; 5] = ["count", "sum", "avg", "min", "max"];

impl Expression {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::Function(name, _) if AGGREGATES.contains(&name.as_str()))
    }

    /// Name of the result column when the select item has no alias
    pub fn column_name(&self) -> String {
        match self {
            Expression::Field(_, name) => name.clone(),
            Expression::Function(name, _) => name.clone(),
            Expression::Window(window) => window.name.clone(),
            _ => "?column?".to_string(),
        }
    }

    /// Rebuilds the tree top-down: where `f` returns a replacement the node is
    /// swapped and not descended into.
    pub fn replace(&self, f: &impl Fn(&Expression) -> Option<Expression>) -> Expression {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        let r = |e: &Expression| Box::new(e.replace(f));
        match self {
            Expression::Field(..) | Expression::Consts(_) => self.clone(),
            Expression::Function(name, args) => {
                Expression::Function(name.clone(), args.iter().map(|a| a.replace(f)).collect())
            }
            Expression::Window(w) => Expression::Window(Box::new(WindowFunction {
                name: w.name.clone(),
                args: w.args.iter().map(|a| a.replace(f)).collect(),
                partition_by: w.partition_by.iter().map(|p| p.replace(f)).collect(),
                order_by: w.order_by.iter().map(|(o, d)| (o.replace(f), *d)).collect(),
            })),
            Expression::Operation(op) => Expression::Operation(match op {
                Operation::And(a, b) => Operation::And(r(a), r(b)),
                Operation::Or(a, b) => Operation::Or(r(a), r(b)),
                Operation::Not(a) => Operation::Not(r(a)),
                Operation::Equal(a, b) => Operation::Equal(r(a), r(b)),
                Operation::NotEqual(a, b) => Operation::NotEqual(r(a), r(b)),
                Operation::GreaterThan(a, b) => Operation::GreaterThan(r(a), r(b)),
                Operation::GreaterThanOrEqual(a, b) => Operation::GreaterThanOrEqual(r(a), r(b)),
                Operation::LessThan(a, b) => Operation::LessThan(r(a), r(b)),
                Operation::LessThanOrEqual(a, b) => Operation::LessThanOrEqual(r(a), r(b)),
                Operation::IsNull(a) => Operation::IsNull(r(a)),
                Operation::Add(a, b) => Operation::Add(r(a), r(b)),
                Operation::Subtract(a, b) => Operation::Subtract(r(a), r(b)),
                Operation::Multiply(a, b) => Operation::Multiply(r(a), r(b)),
                Operation::Divide(a, b) => Operation::Divide(r(a), r(b)),
                Operation::Modulo(a, b) => Operation::Modulo(r(a), r(b)),
                Operation::Negate(a) => Operation::Negate(r(a)),
            }),
        }
    }

    /// Collects matching sub-expressions top-down, without duplicates and
    /// without descending into a match
    pub fn collect(&self, pred: &impl Fn(&Expression) -> bool, out: &mut Vec<Expression>) {
        if pred(self) {
            if !out.contains(self) {
                out.push(self.clone());
            }
            return;
        }
        match self {
            Expression::Field(..) | Expression::Consts(_) => {}
            Expression::Function(_, args) => args.iter().for_each(|a| a.collect(pred, out)),
            Expression::Window(w) => {
                w.args.iter().for_each(|a| a.collect(pred, out));
                w.partition_by.iter().for_each(|p| p.collect(pred, out));
                w.order_by.iter().for_each(|(o, _)| o.collect(pred, out));
            }
            Expression::Operation(op) => match op {
                Operation::Not(a) | Operation::IsNull(a) | Operation::Negate(a) => {
                    a.collect(pred, out)
                }
                Operation::And(a, b)
                | Operation::Or(a, b)
                | Operation::Equal(a, b)
                | Operation::NotEqual(a, b)
                | Operation::GreaterThan(a, b)
                | Operation::GreaterThanOrEqual(a, b)
                | Operation::LessThan(a, b)
                | Operation::LessThanOrEqual(a, b)
                | Operation::Add(a, b)
                | Operation::Subtract(a, b)
                | Operation::Multiply(a, b)
                | Operation::Divide(a, b)
                | Operation::Modulo(a, b) => {
                    a.collect(pred, out);
                    b.collect(pred, out);
                }
            },
        }
    }

    pub fn contains(&self, pred: &impl Fn(&Expression) -> bool) -> bool {
        let mut found = Vec::new();
        self.collect(pred, &mut found);
        !found.is_empty()
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Field(Some(table), name) => write!(f, "{}.{}", table, name),
            Expression::Field(None, name) => write!(f, "{}", name),
            Expression::Consts(Consts::String(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expression::Consts(c) => write!(f, "{}", Value::from(c.clone())),
            Expression::Function(name, args) if args.is_empty() && name == "count" => {
                write!(f, "count(*)")
            }
            Expression::Function(name, args) => write!(f, "{}({})", name, join(args)),
            Expression::Window(w) => {
                write!(f, "{}({}) OVER (", w.name, join(&w.args))?;
                if !w.partition_by.is_empty() {
                    write!(f, "PARTITION BY {}", join(&w.partition_by))?;
                }
                if !w.order_by.is_empty() {
                    if !w.partition_by.is_empty() {
                        write!(f, " ")?;
                    }
                    let order = w
                        .order_by
                        .iter()
                        .map(|(e, d)| match d {
                            OrderDirection::Asc => e.to_string(),
                            OrderDirection::Desc => format!("{} DESC", e),
                        })
                        .collect::<Vec<_>>();
                    write!(f, "ORDER BY {}", order.join(", "))?;
                }
                write!(f, ")")
            }
            Expression::Operation(op) => match op {
                Operation::And(a, b) => write!(f, "({} AND {})", a, b),
                Operation::Or(a, b) => write!(f, "({} OR {})", a, b),
                Operation::Not(a) => write!(f, "NOT {}", a),
                Operation::Equal(a, b) => write!(f, "{} = {}", a, b),
                Operation::NotEqual(a, b) => write!(f, "{} != {}", a, b),
                Operation::GreaterThan(a, b) => write!(f, "{} > {}", a, b),
                Operation::GreaterThanOrEqual(a, b) => write!(f, "{} >= {}", a, b),
                Operation::LessThan(a, b) => write!(f, "{} < {}", a, b),
                Operation::LessThanOrEqual(a, b) => write!(f, "{} <= {}", a, b),
                Operation::IsNull(a) => write!(f, "{} IS NULL", a),
                Operation::Add(a, b) => write!(f, "({} + {})", a, b),
                Operation::Subtract(a, b) => write!(f, "({} - {})", a, b),
                Operation::Multiply(a, b) => write!(f, "({} * {})", a, b),
                Operation::Divide(a, b) => write!(f, "({} / {})", a, b),
                Operation::Modulo(a, b) => write!(f, "({} % {})", a, b),
                Operation::Negate(a) => write!(f, "-{}", a),
            },
        }
    }
}

fn join(exprs: &[Expression]) -> String {
    exprs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

impl From<Consts> for Value {
    fn from(value: Consts) -> Self {
        match value {
            Consts::Null => Value::Null,
            Consts::Boolean(b) => Value::Boolean(b),
            Consts::Integer(i) => Value::Integer(i),
            Consts::Float(f) => Value::Float(f),
            Consts::String(s) => Value::String(s),
        }
    }
}

/// Finds the position of a column among result-set labels.
///
/// Labels of table columns are qualified (`c.name`), computed columns are
/// not. A qualified reference must match exactly; an unqualified one matches
/// either a bare label or the column part of a qualified one, and must not
/// match more than one column.
pub fn resolve_column(columns: &[String], table: Option<&str>, name: &str) -> Result<usize> {
    let candidates = match table {
        Some(table) => {
            let qualified = format!("{}.{}", table, name);
            columns
                .iter()
                .enumerate()
                .filter(|(_, c)| **c == qualified)
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
        }
        None => {
            let suffix = format!(".{}", name);
            columns
                .iter()
                .enumerate()
                .filter(|(_, c)| *c == name || c.ends_with(&suffix))
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
        }
    };
    let display = match table {
        Some(table) => format!("{}.{}", table, name),
        None => name.to_string(),
    };
    match candidates.as_slice() {
        [i] => Ok(*i),
        [] => Err(Error::Internal(format!("column {} not found", display))),
        _ => Err(Error::Internal(format!("column reference {} is ambiguous", display))),
    }
}

/// Evaluates an expression against one row whose columns are labelled `cols`.
///
/// Comparisons follow SQL three-valued logic: anything compared with NULL is
/// NULL, and AND/OR only become NULL when the known side does not decide.
pub fn evaluate_expr(expr: &Expression, cols: &[String], row: &[Value]) -> Result<Value> {
    let eval = |e: &Expression| evaluate_expr(e, cols, row);
    Ok(match expr {
        Expression::Field(table, name) => row[resolve_column(cols, table.as_deref(), name)?].clone(),
        Expression::Consts(c) => Value::from(c.clone()),
        Expression::Function(name, _) if expr.is_aggregate() => {
            return Err(Error::Internal(format!(
                "aggregate function {} is not allowed here",
                name
            )));
        }
        Expression::Function(name, args) => {
            let args = args.iter().map(eval).collect::<Result<Vec<_>>>()?;
            evaluate_scalar(name, args)?
        }
        Expression::Window(w) => {
            return Err(Error::Internal(format!(
                "window function {} is only allowed in the select list",
                w.name
            )));
        }
        Expression::Operation(op) => match op {
            Operation::And(a, b) => match (eval(a)?, eval(b)?) {
                (Value::Boolean(false), _) | (_, Value::Boolean(false)) => Value::Boolean(false),
                (Value::Boolean(true), Value::Boolean(true)) => Value::Boolean(true),
                (Value::Null | Value::Boolean(_), Value::Null | Value::Boolean(_)) => Value::Null,
                (l, r) => return Err(Error::Internal(format!("cannot evaluate {} AND {}", l, r))),
            },
            Operation::Or(a, b) => match (eval(a)?, eval(b)?) {
                (Value::Boolean(true), _) | (_, Value::Boolean(true)) => Value::Boolean(true),
                (Value::Boolean(false), Value::Boolean(false)) => Value::Boolean(false),
                (Value::Null | Value::Boolean(_), Value::Null | Value::Boolean(_)) => Value::Null,
                (l, r) => return Err(Error::Internal(format!("cannot evaluate {} OR {}", l, r))),
            },
            Operation::Not(a) => match eval(a)? {
                Value::Boolean(b) => Value::Boolean(!b),
                Value::Null => Value::Null,
                v => return Err(Error::Internal(format!("cannot evaluate NOT {}", v))),
            },
            Operation::Equal(a, b) => compare(eval(a)?, eval(b)?, |o| o.is_eq())?,
            Operation::NotEqual(a, b) => compare(eval(a)?, eval(b)?, |o| o.is_ne())?,
            Operation::GreaterThan(a, b) => compare(eval(a)?, eval(b)?, |o| o.is_gt())?,
            Operation::GreaterThanOrEqual(a, b) => compare(eval(a)?, eval(b)?, |o| o.is_ge())?,
            Operation::LessThan(a, b) => compare(eval(a)?, eval(b)?, |o| o.is_lt())?,
            Operation::LessThanOrEqual(a, b) => compare(eval(a)?, eval(b)?, |o| o.is_le())?,
            Operation::IsNull(a) => Value::Boolean(eval(a)?.is_null()),
            Operation::Add(a, b) => eval(a)?.checked_add(&eval(b)?)?,
            Operation::Subtract(a, b) => eval(a)?.checked_sub(&eval(b)?)?,
            Operation::Multiply(a, b) => eval(a)?.checked_mul(&eval(b)?)?,
            Operation::Divide(a, b) => eval(a)?.checked_div(&eval(b)?)?,
            Operation::Modulo(a, b) => eval(a)?.checked_rem(&eval(b)?)?,
            Operation::Negate(a) => eval(a)?.checked_neg()?,
        },
    })
}

/// Evaluates an expression that must not reference any column
pub fn evaluate_const(expr: &Expression) -> Result<Value> {
    evaluate_expr(expr, &[], &[])
}

fn compare(
    left: Value,
    right: Value,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Boolean(check(left.sort_cmp(&right)?)))
}

fn evaluate_scalar(name: &str, args: Vec<Value>) -> Result<Value> {
    let arity = |n: std::ops::RangeInclusive<usize>| {
        if n.contains(&args.len()) {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "function {} takes {} to {} arguments, got {}",
                name,
                n.start(),
                n.end(),
                args.len()
            )))
        }
    };
    Ok(match name {
        "round" => {
            arity(1..=2)?;
            let digits = match args.get(1) {
                None => 0,
                Some(Value::Integer(d)) => *d,
                Some(v) => return Err(Error::Internal(format!("invalid ROUND precision {}", v))),
            };
            match &args[0] {
                Value::Float(f) => {
                    let scale = 10_f64.powi(digits.clamp(-15, 15) as i32);
                    Value::Float((f * scale).round() / scale)
                }
                v @ (Value::Integer(_) | Value::Null) => v.clone(),
                v => return Err(Error::Internal(format!("cannot ROUND {}", v))),
            }
        }
        "abs" => {
            arity(1..=1)?;
            match &args[0] {
                Value::Integer(i) => Value::Integer(
                    i.checked_abs()
                        .ok_or_else(|| Error::Internal("integer overflow".into()))?,
                ),
                Value::Float(f) => Value::Float(f.abs()),
                Value::Null => Value::Null,
                v => return Err(Error::Internal(format!("cannot ABS {}", v))),
            }
        }
        "upper" | "lower" | "length" => {
            arity(1..=1)?;
            match &args[0] {
                Value::String(s) if name == "upper" => Value::String(s.to_uppercase()),
                Value::String(s) if name == "lower" => Value::String(s.to_lowercase()),
                Value::String(s) => Value::Integer(s.chars().count() as i64),
                Value::Null => Value::Null,
                v => return Err(Error::Internal(format!("{} expects text, got {}", name, v))),
            }
        }
        "coalesce" => args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null),
        _ => return Err(Error::Internal(format!("unknown function {}", name))),
    })
}

#[cfg(test)]
mod tests {
    use super::{evaluate_expr, resolve_column, Consts, Expression, Operation};
    use crate::{
        error::{Error, Result},
        sql::types::Value,
    };

    fn field(table: Option<&str>, name: &str) -> Box<Expression> {
        Box::new(Expression::Field(table.map(str::to_string), name.to_string()))
    }

    fn int(i: i64) -> Box<Expression> {
        Box::new(Consts::Integer(i).into())
    }

    #[test]
    fn test_resolve_column() -> Result<()> {
        let cols = vec![
            "c.customer_id".to_string(),
            "c.name".to_string(),
            "o.customer_id".to_string(),
            "total".to_string(),
        ];
        assert_eq!(resolve_column(&cols, None, "name")?, 1);
        assert_eq!(resolve_column(&cols, Some("o"), "customer_id")?, 2);
        assert_eq!(resolve_column(&cols, None, "total")?, 3);
        assert!(resolve_column(&cols, None, "customer_id").is_err());
        assert!(resolve_column(&cols, Some("x"), "name").is_err());
        Ok(())
    }

    #[test]
    fn test_three_valued_logic() -> Result<()> {
        let cols = vec!["amount".to_string()];
        let row = vec![Value::Null];
        let null_le_zero: Expression =
            Operation::LessThanOrEqual(field(None, "amount"), int(0)).into();
        assert_eq!(evaluate_expr(&null_le_zero, &cols, &row)?, Value::Null);

        let is_null: Expression = Operation::IsNull(field(None, "amount")).into();
        let either: Expression =
            Operation::Or(Box::new(is_null), Box::new(null_le_zero.clone())).into();
        assert_eq!(evaluate_expr(&either, &cols, &row)?, Value::Boolean(true));

        let both: Expression = Operation::And(
            Box::new(null_le_zero),
            Box::new(Consts::Boolean(false).into()),
        )
        .into();
        assert_eq!(evaluate_expr(&both, &cols, &row)?, Value::Boolean(false));
        Ok(())
    }

    #[test]
    fn test_scalar_functions() -> Result<()> {
        let call = |name: &str, args: Vec<Expression>| {
            evaluate_expr(&Expression::Function(name.to_string(), args), &[], &[])
        };
        assert_eq!(
            call("round", vec![Consts::Float(12.25).into(), Consts::Integer(1).into()])?,
            Value::Float(12.3)
        );
        assert_eq!(call("upper", vec![Consts::String("kenya".into()).into()])?, Value::from("KENYA"));
        assert_eq!(
            call("coalesce", vec![Consts::Null.into(), Consts::Float(0.0).into()])?,
            Value::Float(0.0)
        );
        assert!(call("sum", vec![Consts::Integer(1).into()]).is_err());
        assert!(call("nope", vec![]).is_err());
        Ok(())
    }

    #[test]
    fn test_abs_overflow_is_error() -> Result<()> {
        let abs = |i: i64| {
            evaluate_expr(
                &Expression::Function("abs".to_string(), vec![Consts::Integer(i).into()]),
                &[],
                &[],
            )
        };
        assert_eq!(abs(-41)?, Value::Integer(41));
        assert_eq!(abs(i64::MAX)?, Value::Integer(i64::MAX));
        assert!(matches!(abs(i64::MIN), Err(Error::Internal(msg)) if msg == "integer overflow"));
        Ok(())
    }
}
