//! The teaching dataset: `customers` and `orders`, and how it gets into the
//! backend.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    error::Error,
    sql::engine::{Engine, Session},
};

/// Why a fixture could not be loaded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixtureError {
    /// The records break a dataset invariant
    #[error("invalid fixture: {0}")]
    Invalid(String),
    /// The backend rejected the schema or a row, e.g. a duplicate primary key
    #[error("backend rejected fixture: {0}")]
    Backend(#[from] Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub customer_id: i64,
    pub name: String,
    pub country: String,
    pub age: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: i64,
    /// May reference no customer at all
    pub customer_id: i64,
    /// `None` is a NULL amount
    pub amount: Option<f64>,
    /// ISO-8601 `YYYY-MM-DD`
    pub order_date: String,
}

/// Seed records for both tables, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fixture {
    pub customers: Vec<Customer>,
    pub orders: Vec<Order>,
}

pub const CUSTOMERS_DDL: &str = "CREATE TABLE customers (
    customer_id INT PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    country VARCHAR(50) NOT NULL,
    age INT NOT NULL
);";

pub const ORDERS_DDL: &str = "CREATE TABLE orders (
    order_id INT PRIMARY KEY,
    customer_id INT NOT NULL,
    amount DECIMAL(10, 2),
    order_date DATE NOT NULL
);";

impl Fixture {
    /// The dataset every curriculum example is written against.
    ///
    /// Nigeria has two customers, Mary Smith has no orders, order 3 has no
    /// amount, order 4 is a refund and order 5 belongs to no customer.
    pub fn curriculum() -> Self {
        Fixture::default()
            .customer("John Doe", "Nigeria", 30)
            .customer("Mary Smith", "Kenya", 25)
            .customer("Adewale Ogun", "Nigeria", 41)
            .order(1, Some(250.00), "2024-01-15")
            .order(3, Some(120.50), "2024-02-03")
            .order(1, None, "2024-02-20")
            .order(3, Some(-15.00), "2024-03-01")
            .order(99, Some(80.00), "2024-03-10")
            .order(1, Some(75.25), "2024-03-18")
    }

    /// Appends a customer with the next sequential id
    pub fn customer(mut self, name: &str, country: &str, age: i64) -> Self {
        self.customers.push(Customer {
            customer_id: self.customers.len() as i64 + 1,
            name: name.to_string(),
            country: country.to_string(),
            age,
        });
        self
    }

    /// Appends an order with the next sequential id
    pub fn order(mut self, customer_id: i64, amount: Option<f64>, order_date: &str) -> Self {
        self.orders.push(Order {
            order_id: self.orders.len() as i64 + 1,
            customer_id,
            amount,
            order_date: order_date.to_string(),
        });
        self
    }

    /// Checks the invariants the curriculum relies on: unique ids, a country
    /// with several customers, and an order whose amount is NULL or not
    /// positive.
    pub fn validate(&self) -> Result<(), FixtureError> {
        let mut ids = HashSet::new();
        if let Some(c) = self.customers.iter().find(|c| !ids.insert(c.customer_id)) {
            return Err(FixtureError::Invalid(format!(
                "duplicate customer_id {}",
                c.customer_id
            )));
        }
        let mut ids = HashSet::new();
        if let Some(o) = self.orders.iter().find(|o| !ids.insert(o.order_id)) {
            return Err(FixtureError::Invalid(format!(
                "duplicate order_id {}",
                o.order_id
            )));
        }

        let mut per_country: HashMap<&str, usize> = HashMap::new();
        for c in &self.customers {
            *per_country.entry(c.country.as_str()).or_default() += 1;
        }
        if !per_country.values().any(|&n| n > 1) {
            return Err(FixtureError::Invalid(
                "no country has more than one customer".into(),
            ));
        }
        if !self
            .orders
            .iter()
            .any(|o| o.amount.is_none_or(|amount| amount <= 0.0))
        {
            return Err(FixtureError::Invalid(
                "no order has a NULL or non-positive amount".into(),
            ));
        }
        Ok(())
    }

    /// Schema and INSERT statements that materialize the fixture
    pub fn statements(&self) -> Vec<String> {
        let mut statements = vec![CUSTOMERS_DDL.to_string(), ORDERS_DDL.to_string()];
        if !self.customers.is_empty() {
            let values = self
                .customers
                .iter()
                .map(|c| {
                    format!(
                        "({}, {}, {}, {})",
                        c.customer_id,
                        quote(&c.name),
                        quote(&c.country),
                        c.age
                    )
                })
                .collect::<Vec<_>>();
            statements.push(format!(
                "INSERT INTO customers (customer_id, name, country, age) VALUES {};",
                values.join(", ")
            ));
        }
        if !self.orders.is_empty() {
            let values = self
                .orders
                .iter()
                .map(|o| {
                    let amount = match o.amount {
                        Some(amount) => format!("{:?}", amount),
                        None => "NULL".to_string(),
                    };
                    format!(
                        "({}, {}, {}, {})",
                        o.order_id,
                        o.customer_id,
                        amount,
                        quote(&o.order_date)
                    )
                })
                .collect::<Vec<_>>();
            statements.push(format!(
                "INSERT INTO orders (order_id, customer_id, amount, order_date) VALUES {};",
                values.join(", ")
            ));
        }
        statements
    }

    /// Creates and fills both tables in a single transaction: either the
    /// whole fixture is committed or nothing is.
    pub fn load<E: Engine + 'static>(&self, session: &mut Session<E>) -> Result<(), FixtureError> {
        session.execute_batch(&self.statements())?;
        tracing::info!(
            customers = self.customers.len(),
            orders = self.orders.len(),
            "fixture loaded"
        );
        Ok(())
    }
}

/// SQL string literal
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
