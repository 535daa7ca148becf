use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::types::{DataType, Row, Value},
};

/// Table schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    /// Validates table schema
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Internal(format!(
                "table {} has no columns",
                self.name
            )));
        }

        match self.columns.iter().filter(|c| c.primary_key).count() {
            1 => {}
            0 => {
                return Err(Error::Internal(format!(
                    "No primary key for table {}",
                    self.name
                )))
            }
            _ => {
                return Err(Error::Internal(format!(
                    "Multiple primary keys for table {}",
                    self.name
                )))
            }
        }

        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::Internal(format!(
                    "Duplicate column {} in table {}",
                    column.name, self.name
                )));
            }
            if column.primary_key && column.nullable {
                return Err(Error::Internal(format!(
                    "Primary key {} cannot be nullable",
                    column.name
                )));
            }
            if let Some(default) = &column.default {
                column.check(default)?;
            }
        }

        Ok(())
    }

    /// Checks a full row against the column types and nullability
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Internal(format!(
                "table {} expects {} values, got {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        self.columns
            .iter()
            .zip(row)
            .try_for_each(|(column, value)| column.check(value))
    }

    /// Extracts primary key value from a row
    pub fn get_primary_key(&self, row: &Row) -> Result<Value> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.primary_key)
            .ok_or_else(|| Error::Internal(format!("No primary key for table {}", self.name)))?;
        Ok(row[pos].clone())
    }

    /// Returns the column index for a given column name
    pub fn get_col_index(&self, col_name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == col_name)
            .ok_or(Error::Internal(format!(
                "column {} not found in table {}",
                col_name, self.name
            )))
    }
}

/// Column schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
    /// Whether this column is the primary key
    pub primary_key: bool,
}

impl Column {
    fn check(&self, value: &Value) -> Result<()> {
        match value.datatype() {
            None if self.nullable => Ok(()),
            None => Err(Error::Internal(format!(
                "column {} cannot be null",
                self.name
            ))),
            Some(dt) if dt != self.datatype => Err(Error::Internal(format!(
                "column {} type mismatch: expected {}, got {}",
                self.name, self.datatype, dt
            ))),
            _ => Ok(()),
        }
    }
}
