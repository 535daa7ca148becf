use std::{path::PathBuf, time::Duration};

/// Default per-example execution bound
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Options for one harness run
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub timeout: Duration,
    /// Names of the examples to run; empty runs all of them
    pub examples: Vec<String>,
    /// Where to also write the rendered report
    pub report_path: Option<PathBuf>,
    pub format: ReportFormat,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            examples: Vec::new(),
            report_path: None,
            format: ReportFormat::default(),
        }
    }
}
