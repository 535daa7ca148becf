//! The curriculum examples: each query with the literal rows it must return.

use crate::{harness::runner::ResultRow, sql::types::Value};

/// Builds a `ResultRow` from `column => value` pairs
macro_rules! row {
    ($($column:literal => $value:expr),* $(,)?) => {
        ResultRow(vec![$(($column.to_string(), Value::from($value))),*])
    };
}

/// One named example query and what it must produce
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub name: String,
    pub query: String,
    pub expected: Vec<ResultRow>,
    /// Rows must appear in exactly this order
    pub order_sensitive: bool,
    /// Allowed absolute difference between numbers, exact when `None`
    pub tolerance: Option<f64>,
}

impl Example {
    /// An order-sensitive example with exact comparison and no rows expected
    pub fn new(name: &str, query: &str) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
            expected: Vec::new(),
            order_sensitive: true,
            tolerance: None,
        }
    }

    pub fn expect(mut self, rows: Vec<ResultRow>) -> Self {
        self.expected = rows;
        self
    }

    /// Compare rows as a multiset
    pub fn unordered(mut self) -> Self {
        self.order_sensitive = false;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

/// Looks an example up by name
pub fn find<'a>(examples: &'a [Example], name: &str) -> Option<&'a Example> {
    examples.iter().find(|e| e.name == name)
}

/// Every example of the four-week roadmap, in teaching order, written
/// against `Fixture::curriculum()`.
pub fn curriculum() -> Vec<Example> {
    vec![
        // Week 1: SELECT, WHERE, ORDER BY, LIMIT
        Example::new("week1_select_all", "SELECT * FROM customers;")
            .unordered()
            .expect(vec![
                row!("customer_id" => 1, "name" => "John Doe", "country" => "Nigeria", "age" => 30),
                row!("customer_id" => 2, "name" => "Mary Smith", "country" => "Kenya", "age" => 25),
                row!("customer_id" => 3, "name" => "Adewale Ogun", "country" => "Nigeria", "age" => 41),
            ]),
        Example::new(
            "week1_filter_nigeria",
            "SELECT name, age FROM customers WHERE country = 'Nigeria' ORDER BY age DESC;",
        )
        .expect(vec![
            row!("name" => "Adewale Ogun", "age" => 41),
            row!("name" => "John Doe", "age" => 30),
        ]),
        Example::new(
            "week1_orders_since_march",
            "SELECT order_id, amount FROM orders WHERE order_date >= '2024-03-01' ORDER BY order_date;",
        )
        .expect(vec![
            row!("order_id" => 4, "amount" => -15.0),
            row!("order_id" => 5, "amount" => 80.0),
            row!("order_id" => 6, "amount" => 75.25),
        ]),
        Example::new(
            "week1_top_orders_limit",
            "SELECT order_id, amount FROM orders
             WHERE amount IS NOT NULL
             ORDER BY amount DESC
             LIMIT 2;",
        )
        .expect(vec![
            row!("order_id" => 1, "amount" => 250.0),
            row!("order_id" => 2, "amount" => 120.5),
        ]),
        // Week 2: aggregates, GROUP BY, HAVING
        Example::new(
            "week2_count_customers",
            "SELECT COUNT(*) AS total_customers FROM customers;",
        )
        .expect(vec![row!("total_customers" => 3)]),
        Example::new(
            "week2_group_by_country",
            "SELECT country, COUNT(*) AS customer_count FROM customers GROUP BY country;",
        )
        .unordered()
        .expect(vec![
            row!("country" => "Nigeria", "customer_count" => 2),
            row!("country" => "Kenya", "customer_count" => 1),
        ]),
        Example::new(
            "week2_group_by_country_having",
            "SELECT country, COUNT(*) AS customer_count, ROUND(AVG(age), 1) AS avg_age
             FROM customers
             GROUP BY country
             HAVING COUNT(*) > 1;",
        )
        .tolerance(0.05)
        .expect(vec![
            row!("country" => "Nigeria", "customer_count" => 2, "avg_age" => 35.5),
        ]),
        Example::new(
            "week2_order_stats",
            "SELECT COUNT(*) AS orders, COUNT(amount) AS priced, SUM(amount) AS total,
                    MIN(order_date) AS first_order, MAX(order_date) AS last_order
             FROM orders;",
        )
        .tolerance(0.005)
        .expect(vec![row!(
            "orders" => 6,
            "priced" => 5,
            "total" => 510.75,
            "first_order" => "2024-01-15",
            "last_order" => "2024-03-18",
        )]),
        // Week 3: joins
        Example::new(
            "week3_inner_join",
            "SELECT c.name, o.order_id, o.amount
             FROM customers c
             INNER JOIN orders o ON c.customer_id = o.customer_id
             ORDER BY o.order_id;",
        )
        .expect(vec![
            row!("name" => "John Doe", "order_id" => 1, "amount" => 250.0),
            row!("name" => "Adewale Ogun", "order_id" => 2, "amount" => 120.5),
            row!("name" => "John Doe", "order_id" => 3, "amount" => Value::Null),
            row!("name" => "Adewale Ogun", "order_id" => 4, "amount" => -15.0),
            row!("name" => "John Doe", "order_id" => 6, "amount" => 75.25),
        ]),
        Example::new(
            "week3_left_join",
            "SELECT c.name, o.order_id, o.amount
             FROM customers c
             LEFT JOIN orders o ON c.customer_id = o.customer_id
             ORDER BY c.customer_id, o.order_id;",
        )
        .expect(vec![
            row!("name" => "John Doe", "order_id" => 1, "amount" => 250.0),
            row!("name" => "John Doe", "order_id" => 3, "amount" => Value::Null),
            row!("name" => "John Doe", "order_id" => 6, "amount" => 75.25),
            row!("name" => "Mary Smith", "order_id" => Value::Null, "amount" => Value::Null),
            row!("name" => "Adewale Ogun", "order_id" => 2, "amount" => 120.5),
            row!("name" => "Adewale Ogun", "order_id" => 4, "amount" => -15.0),
        ]),
        Example::new(
            "week3_orphan_orders",
            "SELECT o.order_id, o.customer_id
             FROM customers c
             RIGHT JOIN orders o ON c.customer_id = o.customer_id
             WHERE c.customer_id IS NULL;",
        )
        .expect(vec![row!("order_id" => 5, "customer_id" => 99)]),
        Example::new(
            "week3_total_spent",
            "SELECT c.name, SUM(o.amount) AS total_spent
             FROM customers c
             LEFT JOIN orders o ON c.customer_id = o.customer_id
             GROUP BY c.name
             ORDER BY total_spent DESC;",
        )
        .tolerance(0.005)
        .expect(vec![
            row!("name" => "John Doe", "total_spent" => 325.25),
            row!("name" => "Adewale Ogun", "total_spent" => 105.5),
            row!("name" => "Mary Smith", "total_spent" => Value::Null),
        ]),
        // Week 4: data quality, CTEs, window functions
        Example::new(
            "week4_data_quality_check",
            "SELECT order_id, customer_id, amount
             FROM orders
             WHERE amount IS NULL OR amount <= 0
             ORDER BY order_id;",
        )
        .expect(vec![
            row!("order_id" => 3, "customer_id" => 1, "amount" => Value::Null),
            row!("order_id" => 4, "customer_id" => 3, "amount" => -15.0),
        ]),
        Example::new(
            "week4_cte_big_spenders",
            "WITH totals AS (
                 SELECT customer_id, SUM(amount) AS total
                 FROM orders
                 GROUP BY customer_id
             )
             SELECT c.name, t.total
             FROM customers c
             JOIN totals t ON c.customer_id = t.customer_id
             WHERE t.total > 100
             ORDER BY t.total DESC;",
        )
        .tolerance(0.005)
        .expect(vec![
            row!("name" => "John Doe", "total" => 325.25),
            row!("name" => "Adewale Ogun", "total" => 105.5),
        ]),
        Example::new(
            "week4_rank_customers",
            "SELECT name, age, RANK() OVER (ORDER BY age DESC) AS age_rank
             FROM customers
             ORDER BY age_rank;",
        )
        .expect(vec![
            row!("name" => "Adewale Ogun", "age" => 41, "age_rank" => 1),
            row!("name" => "John Doe", "age" => 30, "age_rank" => 2),
            row!("name" => "Mary Smith", "age" => 25, "age_rank" => 3),
        ]),
        Example::new(
            "week4_top3_per_country",
            "WITH customer_totals AS (
                 SELECT c.customer_id, c.name, c.country, SUM(o.amount) AS total_spent
                 FROM customers c
                 JOIN orders o ON c.customer_id = o.customer_id
                 GROUP BY c.customer_id, c.name, c.country
             ),
             ranked AS (
                 SELECT customer_id, country, name, total_spent,
                        ROW_NUMBER() OVER (
                            PARTITION BY country
                            ORDER BY total_spent DESC, customer_id
                        ) AS rn
                 FROM customer_totals
             )
             SELECT country, name, total_spent, rn
             FROM ranked
             WHERE rn <= 3
             ORDER BY country, rn;",
        )
        .tolerance(0.005)
        .expect(vec![
            row!("country" => "Nigeria", "name" => "John Doe", "total_spent" => 325.25, "rn" => 1),
            row!("country" => "Nigeria", "name" => "Adewale Ogun", "total_spent" => 105.5, "rn" => 2),
        ]),
        Example::new(
            "week4_running_total",
            "SELECT order_id, SUM(amount) OVER (ORDER BY order_date) AS running_total
             FROM orders
             WHERE amount IS NOT NULL
             ORDER BY order_date;",
        )
        .tolerance(0.005)
        .expect(vec![
            row!("order_id" => 1, "running_total" => 250.0),
            row!("order_id" => 2, "running_total" => 370.5),
            row!("order_id" => 4, "running_total" => 355.5),
            row!("order_id" => 5, "running_total" => 435.5),
            row!("order_id" => 6, "running_total" => 510.75),
        ]),
        Example::new(
            "week4_recursive_countdown",
            "WITH RECURSIVE countdown AS (
                 SELECT 3 AS n
                 UNION ALL
                 SELECT n - 1 FROM countdown WHERE n > 1
             )
             SELECT n FROM countdown ORDER BY n DESC;",
        )
        .expect(vec![row!("n" => 3), row!("n" => 2), row!("n" => 1)]),
        Example::new(
            "week4_delete_refunds",
            "DELETE FROM orders WHERE amount <= 0;",
        )
        .expect(vec![row!("rows_affected" => 1)]),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{curriculum, find, Example};

    #[test]
    fn test_curriculum_names_are_unique() {
        let examples = curriculum();
        let names = examples.iter().map(|e| e.name.as_str()).collect::<HashSet<_>>();
        assert_eq!(names.len(), examples.len());
        assert!(examples.iter().all(|e| e.query.trim_end().ends_with(';')));
        assert!(examples.iter().all(|e| !e.expected.is_empty()));
    }

    #[test]
    fn test_find() {
        let examples = curriculum();
        let example = find(&examples, "week2_group_by_country").map(|e| e.order_sensitive);
        assert_eq!(example, Some(false));
        assert!(find(&examples, "week9_missing").is_none());
    }

    #[test]
    fn test_builder_defaults() {
        let example = Example::new("q", "SELECT 1;");
        assert!(example.order_sensitive);
        assert_eq!(example.tolerance, None);
        let example = example.unordered().tolerance(0.1);
        assert!(!example.order_sensitive);
        assert_eq!(example.tolerance, Some(0.1));
    }
}
