use std::collections::BTreeMap;
use std::iter::Peekable;

use ast::{Column, CommonTableExpr, Expression, FromItem, JoinType, Operation, OrderDirection};

use super::types::DataType;
use crate::error::{Error, Result};
use crate::sql::parser::lexer::{Keyword, Lexer, Token};

pub mod ast;
mod lexer;

/// SQL Parser - Converts tokens into Abstract Syntax Tree (AST)
pub struct Parser<'a> {
    lexer: Peekable<Lexer<'a>>,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given SQL input
    pub fn new(input: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(input).peekable(),
        }
    }

    /// Parses exactly one statement terminated by a semicolon
    pub fn parse(&mut self) -> Result<ast::Statement> {
        let stmt = self.parse_statement()?;
        self.next_expect(Token::Semicolon)?;
        // No tokens allowed after semicolon
        if let Some(token) = self.peek()? {
            return Err(Error::Parse(format!("[Parser] Unexpected token {}", token)));
        }
        Ok(stmt)
    }

    /// Parses a statement based on the first token
    fn parse_statement(&mut self) -> Result<ast::Statement> {
        match self.peek()? {
            Some(Token::Keyword(Keyword::Create)) => self.parse_ddl(),
            Some(Token::Keyword(Keyword::Select)) | Some(Token::Keyword(Keyword::With)) => {
                Ok(ast::Statement::Select(Box::new(self.parse_select()?)))
            }
            Some(Token::Keyword(Keyword::Insert)) => self.parse_insert(),
            Some(Token::Keyword(Keyword::Update)) => self.parse_update(),
            Some(Token::Keyword(Keyword::Delete)) => self.parse_delete(),
            Some(t) => Err(Error::Parse(format!("[Parser] Unexpected token {}", t))),
            None => Err(Error::Parse("[Parser] Unexpected end of input".into())),
        }
    }

    /// Parses DDL statements (e.g., CREATE TABLE)
    fn parse_ddl(&mut self) -> Result<ast::Statement> {
        match self.next()? {
            Token::Keyword(Keyword::Create) => match self.next()? {
                Token::Keyword(Keyword::Table) => self.parse_ddl_create_table(),
                token => Err(Error::Parse(format!("[Parser] Unexpected token {}", token))),
            },
            token => Err(Error::Parse(format!("[Parser] Unexpected token {}", token))),
        }
    }

    /// Parses CREATE TABLE statement
    fn parse_ddl_create_table(&mut self) -> Result<ast::Statement> {
        let table_name = self.next_ident()?;
        self.next_expect(Token::OpenParen)?;

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_ddl_column()?);
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        self.next_expect(Token::CloseParen)?;
        Ok(ast::Statement::CreateTable {
            name: table_name,
            columns,
        })
    }

    /// Parses column definition in CREATE TABLE
    fn parse_ddl_column(&mut self) -> Result<ast::Column> {
        let name = self.next_ident()?;
        let datatype = match self.next()? {
            Token::Keyword(Keyword::Int) | Token::Keyword(Keyword::Integer) => DataType::Integer,
            Token::Keyword(Keyword::Bool) | Token::Keyword(Keyword::Boolean) => DataType::Boolean,
            Token::Keyword(Keyword::Float)
            | Token::Keyword(Keyword::Double)
            | Token::Keyword(Keyword::Real)
            | Token::Keyword(Keyword::Decimal)
            | Token::Keyword(Keyword::Numeric) => DataType::Float,
            Token::Keyword(Keyword::String)
            | Token::Keyword(Keyword::Text)
            | Token::Keyword(Keyword::Varchar)
            | Token::Keyword(Keyword::Char)
            | Token::Keyword(Keyword::Date) => DataType::String,
            token => return Err(Error::Parse(format!("[Parser] Unexpected token {}", token))),
        };
        // Length and precision, e.g. VARCHAR(100) or DECIMAL(10, 2), are not enforced
        if self.next_if_token(Token::OpenParen).is_some() {
            loop {
                match self.next()? {
                    Token::Number(_) | Token::Comma => {}
                    Token::CloseParen => break,
                    token => {
                        return Err(Error::Parse(format!("[Parser] Unexpected token {}", token)));
                    }
                }
            }
        }

        let mut column = Column {
            name,
            datatype,
            nullable: None,
            default: None,
            primary_key: false,
        };

        // Parse column constraints (NULL, NOT NULL, DEFAULT, PRIMARY KEY)
        while let Some(Token::Keyword(keyword)) = self.next_if_keyword() {
            match keyword {
                Keyword::Null => column.nullable = Some(true),
                Keyword::Not => {
                    self.next_expect(Token::Keyword(Keyword::Null))?;
                    column.nullable = Some(false);
                }
                Keyword::Default => column.default = Some(self.parse_expression()?),
                Keyword::Primary => {
                    self.next_expect(Token::Keyword(Keyword::Key))?;
                    column.primary_key = true;
                }
                k => return Err(Error::Parse(format!("[Parser] Unexpected keyword {}", k))),
            }
        }

        Ok(column)
    }

    /// Parses `[WITH [RECURSIVE] cte, ...] SELECT ...`
    fn parse_select(&mut self) -> Result<ast::SelectStatement> {
        let mut with = Vec::new();
        if self.next_if_token(Token::Keyword(Keyword::With)).is_some() {
            let recursive = self.next_if_token(Token::Keyword(Keyword::Recursive)).is_some();
            loop {
                with.push(self.parse_cte(recursive)?);
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }
        let mut select = self.parse_select_core()?;
        select.with = with;
        Ok(select)
    }

    fn parse_cte(&mut self, recursive: bool) -> Result<CommonTableExpr> {
        let name = self.next_ident()?;
        self.next_expect(Token::Keyword(Keyword::As))?;
        self.next_expect(Token::OpenParen)?;
        let query = self.parse_select()?;
        let recursive_step = if self.next_if_token(Token::Keyword(Keyword::Union)).is_some() {
            self.next_expect(Token::Keyword(Keyword::All))?;
            if !recursive {
                return Err(Error::Parse(format!(
                    "[Parser] UNION ALL in CTE {} requires WITH RECURSIVE",
                    name
                )));
            }
            Some(self.parse_select()?)
        } else {
            None
        };
        self.next_expect(Token::CloseParen)?;
        Ok(CommonTableExpr {
            name,
            query,
            recursive_step,
        })
    }

    /// Parses the SELECT body: projection, FROM and the trailing clauses
    fn parse_select_core(&mut self) -> Result<ast::SelectStatement> {
        self.next_expect(Token::Keyword(Keyword::Select))?;

        let mut select = Vec::new();
        if self.next_if_token(Token::Asterisk).is_none() {
            loop {
                let expr = self.parse_expression()?;
                let alias = if self.next_if_token(Token::Keyword(Keyword::As)).is_some() {
                    Some(self.next_ident()?)
                } else {
                    self.next_if_ident()
                };
                select.push((expr, alias));
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }

        let from = if self.next_if_token(Token::Keyword(Keyword::From)).is_some() {
            Some(self.parse_from_item()?)
        } else {
            None
        };

        let where_clause = self.parse_where_clause()?;

        let mut group_by = Vec::new();
        if self.next_if_token(Token::Keyword(Keyword::Group)).is_some() {
            self.next_expect(Token::Keyword(Keyword::By))?;
            loop {
                group_by.push(self.parse_expression()?);
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }

        let having = if self.next_if_token(Token::Keyword(Keyword::Having)).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.next_if_token(Token::Keyword(Keyword::Order)).is_some() {
            self.next_expect(Token::Keyword(Keyword::By))?;
            order_by = self.parse_order_list()?;
        }

        let limit = if self.next_if_token(Token::Keyword(Keyword::Limit)).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let offset = if self.next_if_token(Token::Keyword(Keyword::Offset)).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };

        Ok(ast::SelectStatement {
            with: Vec::new(),
            select,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    /// Parses `expr [ASC|DESC], ...`
    fn parse_order_list(&mut self) -> Result<Vec<(Expression, OrderDirection)>> {
        let mut order_by = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            let direction = match self.next_if(|t| {
                matches!(t, Token::Keyword(Keyword::Asc) | Token::Keyword(Keyword::Desc))
            }) {
                Some(Token::Keyword(Keyword::Desc)) => OrderDirection::Desc,
                _ => OrderDirection::Asc,
            };
            order_by.push((expr, direction));
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        Ok(order_by)
    }

    /// Parses a table reference followed by any number of joins
    fn parse_from_item(&mut self) -> Result<FromItem> {
        let mut item = self.parse_from_table()?;
        while let Some(join_type) = self.parse_join_type()? {
            let right = self.parse_from_table()?;
            let predicate = match join_type {
                JoinType::Cross => None,
                _ => {
                    self.next_expect(Token::Keyword(Keyword::On))?;
                    Some(self.parse_expression()?)
                }
            };
            item = FromItem::Join {
                left: Box::new(item),
                right: Box::new(right),
                join_type,
                predicate,
            };
        }
        Ok(item)
    }

    fn parse_from_table(&mut self) -> Result<FromItem> {
        let name = self.next_ident()?;
        let alias = if self.next_if_token(Token::Keyword(Keyword::As)).is_some() {
            Some(self.next_ident()?)
        } else {
            self.next_if_ident()
        };
        Ok(FromItem::Table { name, alias })
    }

    fn parse_join_type(&mut self) -> Result<Option<JoinType>> {
        if self.next_if_token(Token::Comma).is_some() {
            return Ok(Some(JoinType::Cross));
        }
        let join_type = match self.peek()? {
            Some(Token::Keyword(Keyword::Join)) => JoinType::Inner,
            Some(Token::Keyword(Keyword::Inner)) => {
                self.next()?;
                JoinType::Inner
            }
            Some(Token::Keyword(Keyword::Cross)) => {
                self.next()?;
                JoinType::Cross
            }
            Some(Token::Keyword(Keyword::Left)) => {
                self.next()?;
                self.next_if_token(Token::Keyword(Keyword::Outer));
                JoinType::Left
            }
            Some(Token::Keyword(Keyword::Right)) => {
                self.next()?;
                self.next_if_token(Token::Keyword(Keyword::Outer));
                JoinType::Right
            }
            _ => return Ok(None),
        };
        self.next_expect(Token::Keyword(Keyword::Join))?;
        Ok(Some(join_type))
    }

    /// Parses INSERT statement
    fn parse_insert(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Insert))?;
        self.next_expect(Token::Keyword(Keyword::Into))?;

        let table_name = self.next_ident()?;

        // Check if specific columns are specified
        let columns = if self.next_if_token(Token::OpenParen).is_some() {
            let mut cols = Vec::new();
            loop {
                cols.push(self.next_ident()?.to_string());
                match self.next()? {
                    Token::CloseParen => break,
                    Token::Comma => {}
                    token => {
                        return Err(Error::Parse(format!("[Parser] Unexpected token {}", token)));
                    }
                }
            }
            Some(cols)
        } else {
            None
        };

        self.next_expect(Token::Keyword(Keyword::Values))?;
        // Parse multiple value rows: INSERT INTO tbl VALUES (1,2),(3,4);
        let mut values = Vec::new();
        loop {
            self.next_expect(Token::OpenParen)?;
            let mut expr = Vec::new();
            loop {
                expr.push(self.parse_expression()?);
                match self.next()? {
                    Token::CloseParen => break,
                    Token::Comma => {}
                    token => {
                        return Err(Error::Parse(format!("[Parser] Unexpected token {}", token)));
                    }
                }
            }
            values.push(expr);
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        Ok(ast::Statement::Insert {
            table_name,
            columns,
            values,
        })
    }

    /// Parses `UPDATE table SET col = expr, ... [WHERE expr]`
    fn parse_update(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Update))?;
        let table_name = self.next_ident()?;
        self.next_expect(Token::Keyword(Keyword::Set))?;

        let mut columns = BTreeMap::new();
        loop {
            let col = self.next_ident()?;
            self.next_expect(Token::Equal)?;
            let value = self.parse_expression()?;
            if columns.contains_key(&col) {
                return Err(Error::Parse(format!(
                    "[Parser] Duplicate column {} for update",
                    col
                )));
            }
            columns.insert(col, value);
            if self.next_if_token(Token::Comma).is_none() {
                break;
            }
        }
        Ok(ast::Statement::Update {
            table_name,
            columns,
            where_clause: self.parse_where_clause()?,
        })
    }

    /// Parses `DELETE FROM table [WHERE expr]`
    fn parse_delete(&mut self) -> Result<ast::Statement> {
        self.next_expect(Token::Keyword(Keyword::Delete))?;
        self.next_expect(Token::Keyword(Keyword::From))?;
        let table_name = self.next_ident()?;
        Ok(ast::Statement::Delete {
            table_name,
            where_clause: self.parse_where_clause()?,
        })
    }

    fn parse_where_clause(&mut self) -> Result<Option<Expression>> {
        if self.next_if_token(Token::Keyword(Keyword::Where)).is_none() {
            return Ok(None);
        }
        Ok(Some(self.parse_expression()?))
    }

    /// Parses an expression, lowest precedence first:
    /// OR < AND < NOT < comparison / IS NULL < + - < * / % < unary -
    fn parse_expression(&mut self) -> Result<Expression> {
        let mut expr = self.parse_and()?;
        while self.next_if_token(Token::Keyword(Keyword::Or)).is_some() {
            let rhs = self.parse_and()?;
            expr = Operation::Or(Box::new(expr), Box::new(rhs)).into();
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut expr = self.parse_not()?;
        while self.next_if_token(Token::Keyword(Keyword::And)).is_some() {
            let rhs = self.parse_not()?;
            expr = Operation::And(Box::new(expr), Box::new(rhs)).into();
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expression> {
        if self.next_if_token(Token::Keyword(Keyword::Not)).is_some() {
            return Ok(Operation::Not(Box::new(self.parse_not()?)).into());
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let lhs = self.parse_additive()?;
        if self.next_if_token(Token::Keyword(Keyword::Is)).is_some() {
            let negated = self.next_if_token(Token::Keyword(Keyword::Not)).is_some();
            self.next_expect(Token::Keyword(Keyword::Null))?;
            let is_null: Expression = Operation::IsNull(Box::new(lhs)).into();
            return Ok(if negated {
                Operation::Not(Box::new(is_null)).into()
            } else {
                is_null
            });
        }
        let op: fn(Box<Expression>, Box<Expression>) -> Operation = match self.peek()? {
            Some(Token::Equal) => Operation::Equal,
            Some(Token::NotEqual) => Operation::NotEqual,
            Some(Token::GreaterThan) => Operation::GreaterThan,
            Some(Token::GreaterThanOrEqual) => Operation::GreaterThanOrEqual,
            Some(Token::LessThan) => Operation::LessThan,
            Some(Token::LessThanOrEqual) => Operation::LessThanOrEqual,
            _ => return Ok(lhs),
        };
        self.next()?;
        let rhs = self.parse_additive()?;
        Ok(op(Box::new(lhs), Box::new(rhs)).into())
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op: fn(Box<Expression>, Box<Expression>) -> Operation = match self.peek()? {
                Some(Token::Plus) => Operation::Add,
                Some(Token::Minus) => Operation::Subtract,
                _ => return Ok(expr),
            };
            self.next()?;
            let rhs = self.parse_multiplicative()?;
            expr = op(Box::new(expr), Box::new(rhs)).into();
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op: fn(Box<Expression>, Box<Expression>) -> Operation = match self.peek()? {
                Some(Token::Asterisk) => Operation::Multiply,
                Some(Token::Slash) => Operation::Divide,
                Some(Token::Percent) => Operation::Modulo,
                _ => return Ok(expr),
            };
            self.next()?;
            let rhs = self.parse_unary()?;
            expr = op(Box::new(expr), Box::new(rhs)).into();
        }
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if self.next_if_token(Token::Minus).is_some() {
            return Ok(Operation::Negate(Box::new(self.parse_unary()?)).into());
        }
        if self.next_if_token(Token::Plus).is_some() {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    /// Parses literals, column references, function calls and parentheses
    fn parse_primary(&mut self) -> Result<Expression> {
        Ok(match self.next()? {
            Token::Number(n) => {
                // Lexer scans both 123 and 123.45 as Token::Number(String)
                if n.chars().all(|c| c.is_ascii_digit()) {
                    ast::Consts::Integer(n.parse()?).into()
                } else {
                    ast::Consts::Float(n.parse()?).into()
                }
            }
            Token::String(s) => ast::Consts::String(s).into(),
            Token::Keyword(Keyword::True) => ast::Consts::Boolean(true).into(),
            Token::Keyword(Keyword::False) => ast::Consts::Boolean(false).into(),
            Token::Keyword(Keyword::Null) => ast::Consts::Null.into(),
            Token::OpenParen => {
                let expr = self.parse_expression()?;
                self.next_expect(Token::CloseParen)?;
                expr
            }
            Token::Ident(ident) => {
                if self.next_if_token(Token::OpenParen).is_some() {
                    self.parse_function(ident)?
                } else if self.next_if_token(Token::Period).is_some() {
                    Expression::Field(Some(ident), self.next_ident()?)
                } else {
                    Expression::Field(None, ident)
                }
            }
            t => {
                return Err(Error::Parse(format!(
                    "[Parser] Unexpected expression token {}",
                    t
                )))
            }
        })
    }

    /// Parses the argument list after `name(` and an optional OVER clause
    fn parse_function(&mut self, name: String) -> Result<Expression> {
        let mut args = Vec::new();
        if self.next_if_token(Token::Asterisk).is_some() {
            if name != "count" {
                return Err(Error::Parse(format!("[Parser] {}(*) is not supported", name)));
            }
            self.next_expect(Token::CloseParen)?;
        } else if self.next_if_token(Token::CloseParen).is_none() {
            loop {
                args.push(self.parse_expression()?);
                match self.next()? {
                    Token::CloseParen => break,
                    Token::Comma => {}
                    token => {
                        return Err(Error::Parse(format!("[Parser] Unexpected token {}", token)));
                    }
                }
            }
        }

        if self.next_if_token(Token::Keyword(Keyword::Over)).is_none() {
            return Ok(Expression::Function(name, args));
        }

        self.next_expect(Token::OpenParen)?;
        let mut partition_by = Vec::new();
        if self.next_if_token(Token::Keyword(Keyword::Partition)).is_some() {
            self.next_expect(Token::Keyword(Keyword::By))?;
            loop {
                partition_by.push(self.parse_expression()?);
                if self.next_if_token(Token::Comma).is_none() {
                    break;
                }
            }
        }
        let mut order_by = Vec::new();
        if self.next_if_token(Token::Keyword(Keyword::Order)).is_some() {
            self.next_expect(Token::Keyword(Keyword::By))?;
            order_by = self.parse_order_list()?;
        }
        self.next_expect(Token::CloseParen)?;
        Ok(Expression::Window(Box::new(ast::WindowFunction {
            name,
            args,
            partition_by,
            order_by,
        })))
    }

    /// Peeks at the next token
    fn peek(&mut self) -> Result<Option<Token>> {
        self.lexer.peek().cloned().transpose()
    }

    /// Consumes and returns the next token
    fn next(&mut self) -> Result<Token> {
        self.lexer
            .next()
            .unwrap_or_else(|| Err(Error::Parse("[Parser] Unexpected end of input".into())))
    }

    /// Expects and consumes an identifier
    fn next_ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(ident) => Ok(ident),
            token => Err(Error::Parse(format!(
                "[Parser] Expected ident, got token {}",
                token
            ))),
        }
    }

    /// Expects a specific token, returns error if different
    fn next_expect(&mut self, expect: Token) -> Result<()> {
        let token = self.next()?;
        if token != expect {
            return Err(Error::Parse(format!(
                "[Parser] Expected token {}, got {}",
                expect, token
            )));
        }
        Ok(())
    }

    /// Consumes next token if it satisfies the predicate
    fn next_if<F: Fn(&Token) -> bool>(&mut self, predicate: F) -> Option<Token> {
        self.peek().unwrap_or(None).filter(|t| predicate(t))?;
        self.next().ok()
    }

    /// Consumes next token if it's a keyword
    fn next_if_keyword(&mut self) -> Option<Token> {
        self.next_if(|t| matches!(t, Token::Keyword(_)))
    }

    /// Consumes next token if it's an identifier, e.g. an alias without AS
    fn next_if_ident(&mut self) -> Option<String> {
        match self.next_if(|t| matches!(t, Token::Ident(_))) {
            Some(Token::Ident(ident)) => Some(ident),
            _ => None,
        }
    }

    /// Consumes next token if it matches the given token
    fn next_if_token(&mut self, token: Token) -> Option<Token> {
        self.next_if(|t| t == &token)
    }
}
