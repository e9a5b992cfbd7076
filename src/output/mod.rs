mod progress;
mod styling;
mod tables;

use anyhow::Result;
use serde::Serialize;

pub use progress::Spinner;
pub use styling::{bright_green, bright_red, bright_yellow, cyan, dim};
use styling::magenta_bold;
pub use tables::{
    artifacts_table, components_table, environments_table, job_metrics_table, jobs_table,
    pipelines_table, projects_table, slowest_jobs_table, test_metrics_table, tests_table,
    versions_table, workflow_metrics_table, workflows_table,
};

/// Prints the `cci-tools` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("⚙ cci-tools"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CircleCI API toolkit")
    );
}

pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}
