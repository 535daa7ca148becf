//! Key/value storage underneath the SQL engine
//!
//! - `engine`: byte-level storage trait
//! - `memory`: `BTreeMap` backed store
//! - `keycode`: order-preserving key encoding
//! - `mvcc`: snapshot-isolated transactions on top of any `Engine`

pub mod engine;
pub mod keycode;
pub mod memory;
pub mod mvcc;
