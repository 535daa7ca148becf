//! sqlroadmap - runs the SQL roadmap's example queries and checks their output
//!
//! This crate provides:
//! - A small relational engine (lexer, parser, planner, executors) over
//!   MVCC key/value storage
//! - The teaching fixture (`customers`, `orders`) and the example catalog
//! - A harness that runs every example, verifies its rows and reports

pub mod error;
pub mod harness;
pub mod sql;
pub mod storage;
