use std::time::Duration;

use sqlroadmap::{
    harness::{
        self,
        catalog::{self, Example},
        runner::run_example,
        ExampleError, Fixture, FixtureError, HarnessConfig, HarnessError, ReportFormat, ResultRow,
        Verdict,
    },
    sql::{
        engine::{Engine, KVEngine},
        types::Value,
    },
    storage::memory::MemoryEngine,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn run_one(name: &str) -> Result<Vec<ResultRow>, Box<dyn std::error::Error>> {
    let engine = KVEngine::new(MemoryEngine::new());
    let mut session = engine.session()?;
    Fixture::curriculum().load(&mut session)?;
    let examples = catalog::curriculum();
    let example = catalog::find(&examples, name).ok_or(format!("no example {}", name))?;
    Ok(run_example(&mut session, example, Some(Duration::from_secs(5)))?)
}

fn config(examples: &[&str]) -> HarnessConfig {
    HarnessConfig {
        examples: examples.iter().map(|e| e.to_string()).collect(),
        ..HarnessConfig::default()
    }
}

#[test]
fn every_curriculum_example_passes() -> TestResult {
    let report = harness::run(&HarnessConfig::default())?;
    assert_eq!(report.failing_names(), Vec::<&str>::new(), "{}", report.render_text());
    assert_eq!(report.passed(), catalog::curriculum().len());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(harness::exit_code(&Ok(report)), 0);
    Ok(())
}

#[test]
fn runs_are_deterministic() -> TestResult {
    let engine = KVEngine::new(MemoryEngine::new());
    let mut session = engine.session()?;
    Fixture::curriculum().load(&mut session)?;

    let examples = catalog::curriculum();
    let mut first = Vec::new();
    for example in &examples {
        first.push(run_example(&mut session, example, None)?);
    }
    let mut second = Vec::new();
    for example in &examples {
        second.push(run_example(&mut session, example, None)?);
    }
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn filter_nigeria_orders_by_age() -> TestResult {
    let rows = run_one("week1_filter_nigeria")?;
    let people = rows
        .iter()
        .map(|r| (r.get("name").cloned(), r.get("age").cloned()))
        .collect::<Vec<_>>();
    assert_eq!(
        people,
        vec![
            (Some(Value::from("Adewale Ogun")), Some(Value::from(41))),
            (Some(Value::from("John Doe")), Some(Value::from(30))),
        ]
    );
    Ok(())
}

#[test]
fn having_keeps_only_nigeria() -> TestResult {
    let rows = run_one("week2_group_by_country_having")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("country"), Some(&Value::from("Nigeria")));
    assert_eq!(rows[0].get("customer_count"), Some(&Value::from(2)));
    assert_eq!(rows[0].get("avg_age"), Some(&Value::from(35.5)));
    Ok(())
}

#[test]
fn left_join_keeps_customer_without_orders() -> TestResult {
    let rows = run_one("week3_left_join")?;
    let mary = rows
        .iter()
        .filter(|r| r.get("name") == Some(&Value::from("Mary Smith")))
        .collect::<Vec<_>>();
    assert_eq!(mary.len(), 1);
    assert_eq!(mary[0].get("order_id"), Some(&Value::Null));
    assert_eq!(mary[0].get("amount"), Some(&Value::Null));
    Ok(())
}

#[test]
fn data_quality_check_finds_null_and_non_positive_amounts() -> TestResult {
    let rows = run_one("week4_data_quality_check")?;
    assert!(!rows.is_empty());
    for row in &rows {
        match row.get("amount") {
            Some(Value::Null) => {}
            Some(Value::Float(amount)) => assert!(*amount <= 0.0),
            other => panic!("unexpected amount {:?}", other),
        }
    }
    let ids = rows.iter().filter_map(|r| r.get("order_id").cloned()).collect::<Vec<_>>();
    assert_eq!(ids, vec![Value::from(3), Value::from(4)]);
    Ok(())
}

/// Loads `fixture` and runs `week4_top3_per_country` against it
fn top3_rows(fixture: &Fixture) -> Result<Vec<ResultRow>, Box<dyn std::error::Error>> {
    let engine = KVEngine::new(MemoryEngine::new());
    let mut session = engine.session()?;
    fixture.load(&mut session)?;
    let examples = catalog::curriculum();
    let example = catalog::find(&examples, "week4_top3_per_country").ok_or("missing example")?;
    Ok(run_example(&mut session, example, None)?)
}

fn country_rows<'a>(rows: &'a [ResultRow], country: &str) -> Vec<&'a ResultRow> {
    rows.iter()
        .filter(|r| r.get("country") == Some(&Value::from(country)))
        .collect()
}

fn totals(rows: &[&ResultRow]) -> Vec<f64> {
    rows.iter()
        .filter_map(|r| r.get("total_spent").and_then(Value::as_f64))
        .collect()
}

fn names(rows: &[&ResultRow]) -> Vec<Value> {
    rows.iter().filter_map(|r| r.get("name").cloned()).collect()
}

#[test]
fn top3_per_country_keeps_exactly_three_non_increasing() -> TestResult {
    // Five Nigerian customers with orders, one Kenyan
    let mut fixture = Fixture::default()
        .customer("John Doe", "Nigeria", 30)
        .customer("Mary Smith", "Kenya", 25)
        .customer("Adewale Ogun", "Nigeria", 41)
        .customer("Chidi Okafor", "Nigeria", 35)
        .customer("Ngozi Eze", "Nigeria", 28)
        .customer("Bola Ade", "Nigeria", 52);
    for (customer, amount) in [(1, 250.0), (2, 40.0), (3, 120.5), (4, 300.0), (5, 80.0), (6, 10.0)] {
        fixture = fixture.order(customer, Some(amount), "2024-01-01");
    }
    fixture = fixture.order(3, Some(-15.0), "2024-01-02");
    let rows = top3_rows(&fixture)?;

    let nigeria = country_rows(&rows, "Nigeria");
    assert_eq!(totals(&nigeria), vec![300.0, 250.0, 105.5]);
    assert_eq!(
        names(&nigeria),
        vec![Value::from("Chidi Okafor"), Value::from("John Doe"), Value::from("Adewale Ogun")]
    );
    // fewer than three customers with orders: all of them
    assert_eq!(totals(&country_rows(&rows, "Kenya")), vec![40.0]);
    Ok(())
}

#[test]
fn top3_per_country_breaks_ties_at_the_cut() -> TestResult {
    // third and fourth place tie on 100.0
    let fixture = Fixture::default()
        .customer("Chidi Okafor", "Nigeria", 35)
        .customer("John Doe", "Nigeria", 30)
        .customer("Adewale Ogun", "Nigeria", 41)
        .customer("Ngozi Eze", "Nigeria", 28)
        .order(1, Some(300.0), "2024-01-01")
        .order(2, Some(250.0), "2024-01-02")
        .order(3, Some(115.0), "2024-01-03")
        .order(3, Some(-15.0), "2024-01-04")
        .order(4, Some(100.0), "2024-01-05");
    let rows = top3_rows(&fixture)?;

    let nigeria = country_rows(&rows, "Nigeria");
    assert_eq!(nigeria.len(), 3);
    let totals = totals(&nigeria);
    assert!(totals.windows(2).all(|w| w[0] >= w[1]), "{:?}", totals);
    assert_eq!(totals, vec![300.0, 250.0, 100.0]);
    // the lower customer_id wins the tie
    assert_eq!(nigeria[2].get("name"), Some(&Value::from("Adewale Ogun")));
    let positions = nigeria.iter().filter_map(|r| r.get("rn").cloned()).collect::<Vec<_>>();
    assert_eq!(positions, vec![Value::from(1), Value::from(2), Value::from(3)]);
    Ok(())
}

#[test]
fn deleting_example_does_not_leak_into_later_examples() -> TestResult {
    let mut examples = vec![Example::new("wipe_orders", "DELETE FROM orders;")];
    examples.extend(catalog::curriculum());
    let mut config = config(&["wipe_orders", "week4_data_quality_check", "week3_inner_join"]);
    config.timeout = Duration::from_secs(5);

    let report = harness::run_with(&Fixture::curriculum(), &examples, &config)?;
    // the wipe itself fails verification (it expects no rows) but changes nothing
    assert_eq!(report.failing_names(), vec!["wipe_orders"]);
    assert_eq!(report.passed(), 2);
    Ok(())
}

#[test]
fn runaway_recursive_cte_times_out_and_run_continues() -> TestResult {
    let forever = Example::new(
        "forever",
        "WITH RECURSIVE forever AS (SELECT 1 AS n UNION ALL SELECT n + 1 FROM forever)
         SELECT n FROM forever;",
    );
    let mut examples = vec![forever];
    examples.extend(catalog::curriculum());
    let mut config = config(&["forever", "week1_filter_nigeria"]);
    config.timeout = Duration::from_millis(50);

    let report = harness::run_with(&Fixture::curriculum(), &examples, &config)?;
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].verdict, Verdict::Timeout { limit_ms: 50 });
    assert_eq!(report.outcomes[1].verdict, Verdict::Pass);
    assert_eq!(report.exit_code(), 1);
    Ok(())
}

#[test]
fn malformed_query_is_reported_not_fatal() -> TestResult {
    let engine = KVEngine::new(MemoryEngine::new());
    let mut session = engine.session()?;
    Fixture::curriculum().load(&mut session)?;

    let typo = Example::new("typo", "SELEC name FROM customers;");
    assert!(matches!(run_example(&mut session, &typo, None), Err(ExampleError::Query(_))));
    let missing = Example::new("missing", "SELECT name FROM clients;");
    assert!(matches!(
        run_example(&mut session, &missing, None),
        Err(ExampleError::Query(msg)) if msg.contains("clients")
    ));
    Ok(())
}

#[test]
fn integer_overflow_in_abs_fails_only_its_example() -> TestResult {
    let overflow = Example::new("abs_min", "SELECT ABS(-9223372036854775807 - 1) AS a;");
    let mut examples = vec![overflow];
    examples.extend(catalog::curriculum());
    let config = config(&["abs_min", "week1_filter_nigeria"]);

    let report = harness::run_with(&Fixture::curriculum(), &examples, &config)?;
    assert!(matches!(
        &report.outcomes[0].verdict,
        Verdict::QueryError { message } if message.contains("integer overflow")
    ));
    assert_eq!(report.outcomes[1].verdict, Verdict::Pass);
    Ok(())
}

#[test]
fn duplicate_primary_key_fixture_is_fatal() {
    let mut fixture = Fixture::curriculum();
    fixture.orders[5].order_id = 2;
    let result = harness::run_with(&fixture, &catalog::curriculum(), &HarnessConfig::default());
    assert!(matches!(result, Err(HarnessError::Fixture(_))));

    // the backend refuses it too when loaded without validation
    let engine = KVEngine::new(MemoryEngine::new());
    let loaded = engine
        .session()
        .map_err(FixtureError::from)
        .and_then(|mut session| fixture.load(&mut session));
    assert!(matches!(loaded, Err(FixtureError::Backend(_))));
}

#[test]
fn unknown_example_is_fatal() {
    let result = harness::run(&config(&["week1_filter_nigeria", "week5_nope"]));
    assert_eq!(harness::exit_code(&result), 1);
    assert!(matches!(result, Err(HarnessError::UnknownExample(name)) if name == "week5_nope"));
}

#[test]
fn report_is_written_as_json() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("report.json");
    let config = HarnessConfig {
        report_path: Some(path.clone()),
        format: ReportFormat::Json,
        ..config(&["week1_select_all", "week2_count_customers"])
    };
    harness::run(&config)?;

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(json["passed"], 2);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["examples"][0]["name"], "week1_select_all");
    assert_eq!(json["examples"][1]["verdict"], "pass");
    Ok(())
}
