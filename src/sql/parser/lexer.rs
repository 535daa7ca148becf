//! Splits query text into tokens for the parser.

use std::{fmt::Display, iter::Peekable, str::Chars};

use crate::error::{Error, Result};

/// A token of query text
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    /// Table, column or alias name, lowercased
    Ident(String),
    /// Contents of a quoted literal, quotes removed
    String(String),
    /// Digits as written; the parser decides integer or float
    Number(String),
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,
    Period,
    Asterisk,
    Plus,
    Minus,
    Slash,
    Percent,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Keyword(keyword) => f.write_str(keyword.to_str()),
            Token::Ident(ident) => f.write_str(ident),
            Token::String(v) => write!(f, "'{}'", v),
            Token::Number(n) => f.write_str(n),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::Period => f.write_str("."),
            Token::Asterisk => f.write_str("*"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Equal => f.write_str("="),
            Token::NotEqual => f.write_str("!="),
            Token::GreaterThan => f.write_str(">"),
            Token::GreaterThanOrEqual => f.write_str(">="),
            Token::LessThan => f.write_str("<"),
            Token::LessThanOrEqual => f.write_str("<="),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    // DDL
    Create,
    Table,
    Primary,
    Key,
    Default,
    // data types
    Int,
    Integer,
    Boolean,
    Bool,
    String,
    Text,
    Varchar,
    Char,
    Float,
    Double,
    Real,
    Decimal,
    Numeric,
    Date,
    // DML
    Select,
    From,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Where,
    As,
    Group,
    By,
    Having,
    Order,
    Asc,
    Desc,
    Limit,
    Offset,
    // joins
    Join,
    Inner,
    Left,
    Right,
    Cross,
    Outer,
    On,
    // CTEs and windows
    With,
    Recursive,
    Union,
    All,
    Over,
    Partition,
    // operators and literals
    And,
    Or,
    Not,
    Is,
    Null,
    True,
    False,
}

impl Keyword {
    /// Keyword for `ident` regardless of case, `None` for plain names
    pub fn from_str(ident: &str) -> Option<Keyword> {
        Some(match ident.to_uppercase().as_ref() {
            "CREATE" => Keyword::Create,
            "TABLE" => Keyword::Table,
            "PRIMARY" => Keyword::Primary,
            "KEY" => Keyword::Key,
            "DEFAULT" => Keyword::Default,
            "INT" => Keyword::Int,
            "INTEGER" => Keyword::Integer,
            "BOOLEAN" => Keyword::Boolean,
            "BOOL" => Keyword::Bool,
            "STRING" => Keyword::String,
            "TEXT" => Keyword::Text,
            "VARCHAR" => Keyword::Varchar,
            "CHAR" => Keyword::Char,
            "FLOAT" => Keyword::Float,
            "DOUBLE" => Keyword::Double,
            "REAL" => Keyword::Real,
            "DECIMAL" => Keyword::Decimal,
            "NUMERIC" => Keyword::Numeric,
            "DATE" => Keyword::Date,
            "SELECT" => Keyword::Select,
            "FROM" => Keyword::From,
            "INSERT" => Keyword::Insert,
            "INTO" => Keyword::Into,
            "VALUES" => Keyword::Values,
            "UPDATE" => Keyword::Update,
            "SET" => Keyword::Set,
            "DELETE" => Keyword::Delete,
            "WHERE" => Keyword::Where,
            "AS" => Keyword::As,
            "GROUP" => Keyword::Group,
            "BY" => Keyword::By,
            "HAVING" => Keyword::Having,
            "ORDER" => Keyword::Order,
            "ASC" => Keyword::Asc,
            "DESC" => Keyword::Desc,
            "LIMIT" => Keyword::Limit,
            "OFFSET" => Keyword::Offset,
            "JOIN" => Keyword::Join,
            "INNER" => Keyword::Inner,
            "LEFT" => Keyword::Left,
            "RIGHT" => Keyword::Right,
            "CROSS" => Keyword::Cross,
            "OUTER" => Keyword::Outer,
            "ON" => Keyword::On,
            "WITH" => Keyword::With,
            "RECURSIVE" => Keyword::Recursive,
            "UNION" => Keyword::Union,
            "ALL" => Keyword::All,
            "OVER" => Keyword::Over,
            "PARTITION" => Keyword::Partition,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "NOT" => Keyword::Not,
            "IS" => Keyword::Is,
            "NULL" => Keyword::Null,
            "TRUE" => Keyword::True,
            "FALSE" => Keyword::False,
            _ => return None,
        })
    }

    pub fn to_str(&self) -> &str {
        match self {
            Keyword::Create => "CREATE",
            Keyword::Table => "TABLE",
            Keyword::Primary => "PRIMARY",
            Keyword::Key => "KEY",
            Keyword::Default => "DEFAULT",
            Keyword::Int => "INT",
            Keyword::Integer => "INTEGER",
            Keyword::Boolean => "BOOLEAN",
            Keyword::Bool => "BOOL",
            Keyword::String => "STRING",
            Keyword::Text => "TEXT",
            Keyword::Varchar => "VARCHAR",
            Keyword::Char => "CHAR",
            Keyword::Float => "FLOAT",
            Keyword::Double => "DOUBLE",
            Keyword::Real => "REAL",
            Keyword::Decimal => "DECIMAL",
            Keyword::Numeric => "NUMERIC",
            Keyword::Date => "DATE",
            Keyword::Select => "SELECT",
            Keyword::From => "FROM",
            Keyword::Insert => "INSERT",
            Keyword::Into => "INTO",
            Keyword::Values => "VALUES",
            Keyword::Update => "UPDATE",
            Keyword::Set => "SET",
            Keyword::Delete => "DELETE",
            Keyword::Where => "WHERE",
            Keyword::As => "AS",
            Keyword::Group => "GROUP",
            Keyword::By => "BY",
            Keyword::Having => "HAVING",
            Keyword::Order => "ORDER",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::Limit => "LIMIT",
            Keyword::Offset => "OFFSET",
            Keyword::Join => "JOIN",
            Keyword::Inner => "INNER",
            Keyword::Left => "LEFT",
            Keyword::Right => "RIGHT",
            Keyword::Cross => "CROSS",
            Keyword::Outer => "OUTER",
            Keyword::On => "ON",
            Keyword::With => "WITH",
            Keyword::Recursive => "RECURSIVE",
            Keyword::Union => "UNION",
            Keyword::All => "ALL",
            Keyword::Over => "OVER",
            Keyword::Partition => "PARTITION",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::Is => "IS",
            Keyword::Null => "NULL",
            Keyword::True => "TRUE",
            Keyword::False => "FALSE",
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// Yields tokens until the input runs out or a character can't start one
pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => self
                .iter
                .peek()
                .map(|c| Err(Error::Parse(format!("[Lexer] Unexpected character {}", c)))),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(sql_text: &'a str) -> Self {
        Self {
            iter: sql_text.chars().peekable(),
        }
    }

    /// Takes the next char only when `predicate` accepts it
    fn next_if<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        self.iter.peek().filter(|&c| predicate(*c))?;
        self.iter.next()
    }

    /// Takes the longest run of chars `predicate` accepts, `None` if empty
    fn next_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<String> {
        let mut value = String::new();
        while let Some(c) = self.next_if(&predicate) {
            value.push(c);
        }
        Some(value).filter(|v| !v.is_empty())
    }

    fn next_if_token<F: Fn(char) -> Option<Token>>(&mut self, predicate: F) -> Option<Token> {
        let token = self.iter.peek().and_then(|c| predicate(*c))?;
        self.iter.next();
        Some(token)
    }

    /// Skips whitespace and `--` line comments
    fn erase_whitespace(&mut self) {
        loop {
            self.next_while(|c| c.is_whitespace());
            let mut ahead = self.iter.clone();
            if ahead.next() == Some('-') && ahead.next() == Some('-') {
                self.next_while(|c| c != '\n');
            } else {
                return;
            }
        }
    }

    fn scan(&mut self) -> Result<Option<Token>> {
        self.erase_whitespace();
        match self.iter.peek() {
            Some('\'') => self.scan_string(),
            Some(c) if c.is_ascii_digit() => Ok(self.scan_number()),
            Some(c) if c.is_alphabetic() || *c == '_' => Ok(self.scan_ident()),
            Some(_) => Ok(self.scan_symbol()),
            None => Ok(None),
        }
    }

    /// Scans a string literal, `''` inside the quotes is an escaped quote
    fn scan_string(&mut self) -> Result<Option<Token>> {
        self.iter.next();
        let mut val = String::new();

        loop {
            match self.iter.next() {
                Some('\'') => {
                    if self.next_if(|c| c == '\'').is_some() {
                        val.push('\'');
                    } else {
                        break;
                    }
                }
                Some(c) => val.push(c),
                None => return Err(Error::Parse("[Lexer] Unexpected end of string".into())),
            }
        }
        Ok(Some(Token::String(val)))
    }

    /// Digits with an optional fractional part; a leading sign is a separate token
    fn scan_number(&mut self) -> Option<Token> {
        let mut digits = self.next_while(|c| c.is_ascii_digit())?;
        if self.next_if(|c| c == '.').is_some() {
            digits.push('.');
            digits.extend(self.next_while(|c| c.is_ascii_digit()));
        }
        Some(Token::Number(digits))
    }

    fn scan_ident(&mut self) -> Option<Token> {
        let mut word = self.next_if(|c| c.is_alphabetic() || c == '_')?.to_string();
        word.extend(self.next_while(|c| c.is_alphanumeric() || c == '_'));
        Some(match Keyword::from_str(&word) {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Ident(word.to_lowercase()),
        })
    }

    /// Scans an operator or punctuation token, two characters where needed
    fn scan_symbol(&mut self) -> Option<Token> {
        let token = self.next_if_token(|c| match c {
            '*' => Some(Token::Asterisk),
            '(' => Some(Token::OpenParen),
            ')' => Some(Token::CloseParen),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            '.' => Some(Token::Period),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '=' => Some(Token::Equal),
            '>' => Some(Token::GreaterThan),
            '<' => Some(Token::LessThan),
            '!' => Some(Token::NotEqual),
            _ => None,
        })?;
        Some(match token {
            Token::GreaterThan if self.next_if(|c| c == '=').is_some() => Token::GreaterThanOrEqual,
            Token::LessThan if self.next_if(|c| c == '=').is_some() => Token::LessThanOrEqual,
            Token::LessThan if self.next_if(|c| c == '>').is_some() => Token::NotEqual,
            // a lone '!' is not an operator
            Token::NotEqual => {
                self.next_if(|c| c == '=')?;
                Token::NotEqual
            }
            token => token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Lexer;
    use crate::{
        error::Result,
        sql::parser::lexer::{Keyword, Token},
    };

    fn lex(sql: &str) -> Result<Vec<Token>> {
        Lexer::new(sql).collect::<Result<Vec<_>>>()
    }

    #[test]
    fn test_lexer_create_table() -> Result<()> {
        let tokens = lex("CREATE table customers
                (
                    customer_id int primary key,
                    amount decimal(10, 2)
                );")?;

        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Create),
                Token::Keyword(Keyword::Table),
                Token::Ident("customers".to_string()),
                Token::OpenParen,
                Token::Ident("customer_id".to_string()),
                Token::Keyword(Keyword::Int),
                Token::Keyword(Keyword::Primary),
                Token::Keyword(Keyword::Key),
                Token::Comma,
                Token::Ident("amount".to_string()),
                Token::Keyword(Keyword::Decimal),
                Token::OpenParen,
                Token::Number("10".to_string()),
                Token::Comma,
                Token::Number("2".to_string()),
                Token::CloseParen,
                Token::CloseParen,
                Token::Semicolon
            ]
        );
        Ok(())
    }

    #[test]
    fn test_lexer_select_with_operators_and_comments() -> Result<()> {
        let tokens = lex("-- week 1: filtering
            SELECT c.name FROM customers c -- alias
            WHERE age >= 30 AND country <> 'Nigeria' OR amount != 1.5;")?;

        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Select),
                Token::Ident("c".to_string()),
                Token::Period,
                Token::Ident("name".to_string()),
                Token::Keyword(Keyword::From),
                Token::Ident("customers".to_string()),
                Token::Ident("c".to_string()),
                Token::Keyword(Keyword::Where),
                Token::Ident("age".to_string()),
                Token::GreaterThanOrEqual,
                Token::Number("30".to_string()),
                Token::Keyword(Keyword::And),
                Token::Ident("country".to_string()),
                Token::NotEqual,
                Token::String("Nigeria".to_string()),
                Token::Keyword(Keyword::Or),
                Token::Ident("amount".to_string()),
                Token::NotEqual,
                Token::Number("1.5".to_string()),
                Token::Semicolon,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_lexer_strings_and_minus() -> Result<()> {
        assert_eq!(
            lex("'O''Brien', -15.00, a-b")?,
            vec![
                Token::String("O'Brien".to_string()),
                Token::Comma,
                Token::Minus,
                Token::Number("15.00".to_string()),
                Token::Comma,
                Token::Ident("a".to_string()),
                Token::Minus,
                Token::Ident("b".to_string()),
            ]
        );
        assert!(lex("'unterminated").is_err());
        assert!(lex("select ! from t").is_err());
        Ok(())
    }
}
