use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::{
        executor::is_true,
        parser::ast::{evaluate_expr, Expression},
        schema::Table,
        types::{Row, Value},
    },
    storage::{self, engine::Engine as StorageEngine, keycode::serialize_key},
};

use super::{Engine, Transaction};

/// Key-value store backed SQL engine
pub struct KVEngine<E: StorageEngine> {
    pub kv: storage::mvcc::Mvcc<E>,
}

impl<E: StorageEngine> Clone for KVEngine<E> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
        }
    }
}

impl<E: StorageEngine> KVEngine<E> {
    pub fn new(engine: E) -> Self {
        Self {
            kv: storage::mvcc::Mvcc::new(engine),
        }
    }
}

impl<E: StorageEngine + 'static> Engine for KVEngine<E> {
    type Transaction = KVTransaction<E>;

    fn begin(&self) -> Result<Self::Transaction> {
        Ok(Self::Transaction::new(self.kv.begin()?))
    }
}

/// Key-value transaction (wrapper around MVCC transaction)
pub struct KVTransaction<E: StorageEngine> {
    txn: storage::mvcc::MvccTransaction<E>,
    deadline: Option<(Instant, Duration)>,
}

impl<E: StorageEngine> KVTransaction<E> {
    pub fn new(txn: storage::mvcc::MvccTransaction<E>) -> Self {
        Self {
            txn,
            deadline: None,
        }
    }
}

impl<E: StorageEngine> Transaction for KVTransaction<E> {
    fn commit(&self) -> Result<()> {
        self.txn.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.txn.rollback()
    }

    fn set_timeout(&mut self, limit: Duration) {
        self.deadline = Some((Instant::now() + limit, limit));
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some((deadline, limit)) if Instant::now() >= deadline => {
                Err(Error::Timeout(limit.as_millis() as u64))
            }
            _ => Ok(()),
        }
    }

    fn create_row(&mut self, table_name: String, row: Row) -> Result<()> {
        let table = self.must_get_table(table_name.clone())?;
        table.validate_row(&row)?;

        // Store row data: key = table name + primary key value, value = serialized row
        let id = table.get_primary_key(&row)?;
        let key = Key::Row(table_name.clone(), id.clone()).encode()?;
        if self.txn.get(key.clone())?.is_some() {
            return Err(Error::Internal(format!(
                "duplicate primary key {} in table {}",
                id, table_name
            )));
        }
        self.txn.set(key, bincode::serialize(&row)?)?;

        Ok(())
    }

    fn update_row(&mut self, table: &Table, id: &Value, row: Row) -> Result<()> {
        // A changed primary key moves the row to a new key
        if table.get_primary_key(&row)? != *id {
            self.delete_row(table, id)?;
            return self.create_row(table.name.clone(), row);
        }
        table.validate_row(&row)?;
        let key = Key::Row(table.name.clone(), id.clone()).encode()?;
        self.txn.set(key, bincode::serialize(&row)?)
    }

    fn delete_row(&mut self, table: &Table, id: &Value) -> Result<()> {
        let key = Key::Row(table.name.clone(), id.clone()).encode()?;
        self.txn.delete(key)
    }

    fn scan_table(&self, table_name: String, filter: Option<Expression>) -> Result<Vec<Row>> {
        let table = self.must_get_table(table_name.clone())?;
        let columns = table
            .columns
            .iter()
            .map(|c| format!("{}.{}", table.name, c.name))
            .collect::<Vec<_>>();

        // Use prefix scan to find all rows in the table
        let prefix = KeyPrefix::Row(table_name).encode()?;
        let mut rows = Vec::new();
        for result in self.txn.scan_prefix(prefix)? {
            let row: Row = bincode::deserialize(&result.value)?;
            match &filter {
                Some(expr) if !is_true(evaluate_expr(expr, &columns, &row)?)? => {}
                _ => rows.push(row),
            }
        }
        Ok(rows)
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        // Check if table already exists
        if self.get_table(table.name.clone())?.is_some() {
            return Err(Error::Internal(format!(
                "table {} already exists",
                table.name
            )));
        }
        table.validate()?;

        // Store table schema: key = table name, value = serialized table schema
        let key = Key::Table(table.name.clone()).encode()?;
        let value = bincode::serialize(&table)?;
        self.txn.set(key, value)?;

        Ok(())
    }

    fn get_table(&self, table_name: String) -> Result<Option<Table>> {
        let key = Key::Table(table_name).encode()?;
        Ok(self
            .txn
            .get(key)?
            .map(|v| bincode::deserialize(&v))
            .transpose()?)
    }
}

/// Key types for KV storage operations, encoded with the order-preserving
/// keycode so rows scan in primary key order
#[derive(Debug, Serialize, Deserialize)]
enum Key {
    Table(String),
    Row(String, Value),
}

impl Key {
    fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }
}

/// Key prefix types for prefix scanning; variant order must match `Key`
#[derive(Debug, Serialize, Deserialize)]
enum KeyPrefix {
    #[allow(dead_code)]
    Table,
    Row(String),
}

impl KeyPrefix {
    fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        error::{Error, Result},
        sql::{
            engine::{Engine, Transaction},
            executor::ResultSet,
            types::Value,
        },
        storage::memory::MemoryEngine,
    };

    use super::KVEngine;

    fn setup() -> Result<KVEngine<MemoryEngine>> {
        let kvengine = KVEngine::new(MemoryEngine::new());
        let mut s = kvengine.session()?;
        s.execute_batch(&[
            "create table orders (order_id int primary key, customer_id int not null, amount decimal(10, 2), note text default 'none');",
            "insert into orders values (2, 3, 120.50), (1, 1, 250);",
            "insert into orders (amount, customer_id, order_id) values (-15, 3, 4);",
        ])?;
        Ok(kvengine)
    }

    fn rows(result: ResultSet) -> Result<Vec<Vec<Value>>> {
        Ok(result.into_rows()?.1)
    }

    #[test]
    fn test_create_table_and_insert() -> Result<()> {
        let kvengine = setup()?;
        let mut s = kvengine.session()?;

        let result = s.execute("select * from orders;")?;
        let (columns, rows) = result.into_rows()?;
        assert_eq!(columns, vec!["order_id", "customer_id", "amount", "note"]);
        // primary key order, integer amounts widened to the decimal column
        assert_eq!(
            rows,
            vec![
                vec![Value::from(1), Value::from(1), Value::from(250.0), Value::from("none")],
                vec![Value::from(2), Value::from(3), Value::from(120.5), Value::from("none")],
                vec![Value::from(4), Value::from(3), Value::from(-15.0), Value::from("none")],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_primary_key_rolls_back_batch() -> Result<()> {
        let kvengine = setup()?;
        let mut s = kvengine.session()?;
        let err = s.execute_batch(&[
            "insert into orders values (5, 99, 80.0);",
            "insert into orders values (1, 1, 1.0);",
        ]);
        assert!(matches!(err, Err(Error::Internal(msg)) if msg.contains("duplicate primary key")));
        // the first insert of the failed batch is gone too
        assert_eq!(rows(s.execute("select order_id from orders;")?)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_update_and_delete() -> Result<()> {
        let kvengine = setup()?;
        let mut s = kvengine.session()?;
        assert_eq!(
            s.execute("update orders set amount = amount * 2 where customer_id = 3;")?,
            ResultSet::Update { count: 2 }
        );
        assert_eq!(
            s.execute("delete from orders where amount <= 0;")?,
            ResultSet::Delete { count: 1 }
        );
        assert_eq!(
            rows(s.execute("select order_id, amount from orders;")?)?,
            vec![
                vec![Value::from(1), Value::from(250.0)],
                vec![Value::from(2), Value::from(241.0)],
            ]
        );
        assert!(s.execute("update orders set customer_id = null;").is_err());
        Ok(())
    }

    #[test]
    fn test_snapshot_is_rolled_back() -> Result<()> {
        let kvengine = setup()?;
        let mut s = kvengine.session()?;
        assert_eq!(
            s.query_snapshot("delete from orders;", None)?,
            ResultSet::Delete { count: 3 }
        );
        assert_eq!(rows(s.execute("select * from orders;")?)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_deadline() -> Result<()> {
        let kvengine = setup()?;
        let mut txn = kvengine.begin()?;
        txn.check_deadline()?;
        txn.set_timeout(Duration::ZERO);
        assert_eq!(txn.check_deadline(), Err(Error::Timeout(0)));
        txn.rollback()?;
        Ok(())
    }
}
