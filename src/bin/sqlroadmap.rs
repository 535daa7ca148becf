//! sqlroadmap CLI - verify the roadmap's example queries
//!
//! Loads the teaching fixture, runs every example and prints a pass/fail
//! report. Exits 0 when all examples pass and 1 otherwise, including when
//! the run itself cannot complete.

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use sqlroadmap::harness::{self, catalog, HarnessConfig, ReportFormat};
use tracing_subscriber::EnvFilter;

/// Run the SQL roadmap's example queries against the teaching dataset
#[derive(Parser)]
#[command(name = "sqlroadmap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Per-example execution bound in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Run only this example (repeatable)
    #[arg(short, long = "example", value_name = "NAME")]
    examples: Vec<String>,

    /// Also write the report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    /// Print the example names and exit
    #[arg(long)]
    list: bool,
}

impl From<Cli> for HarnessConfig {
    fn from(cli: Cli) -> Self {
        HarnessConfig {
            timeout: Duration::from_millis(cli.timeout_ms),
            examples: cli.examples,
            report_path: cli.report,
            format: cli.format,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.list {
        for example in catalog::curriculum() {
            println!("{}", example.name);
        }
        return ExitCode::SUCCESS;
    }

    let config = HarnessConfig::from(cli);
    let result = harness::run(&config).and_then(|report| {
        print!("{}", report.render(config.format)?);
        Ok(report)
    });
    if let Err(err) = &result {
        eprintln!("error: {}", err);
    }
    ExitCode::from(harness::exit_code(&result))
}
