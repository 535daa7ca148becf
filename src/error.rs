use std::{array::TryFromSliceError, fmt::Display, string::FromUtf8Error, sync::PoisonError};

use bincode::ErrorKind;
use serde::{de, ser};
use thiserror::Error;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the SQL backend and its storage layers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// SQL lexing or parsing error
    #[error("parse error {0}")]
    Parse(String),
    /// Internal error (planning, execution, storage, serialization)
    #[error("internal error {0}")]
    Internal(String),
    /// MVCC write conflict
    #[error("write conflict, try transaction")]
    WriteConflict,
    /// The statement ran past its deadline
    #[error("execution exceeded {0}ms")]
    Timeout(u64),
}

impl From<std::num::ParseIntError> for Error {
    fn from(value: std::num::ParseIntError) -> Self {
        Error::Parse(value.to_string())
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(value: std::num::ParseFloatError) -> Self {
        Error::Parse(value.to_string())
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(value: PoisonError<T>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<Box<ErrorKind>> for Error {
    fn from(value: Box<ErrorKind>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Error::Internal(value.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Internal(value.to_string())
    }
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }
}
