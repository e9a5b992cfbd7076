use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;
use serde::Serialize;

use crate::error::UsageReportError;

pub const DEFAULT_THRESHOLD: f64 = 40.0;

const PROJECT: &str = "project_name";
const WORKFLOW: &str = "workflow_name";
const JOB: &str = "job_name";
const RESOURCE_CLASS: &str = "resource_class";
const MEDIAN_CPU: &str = "median_cpu_utilization_pct";
const MAX_CPU: &str = "max_cpu_utilization_pct";
const MEDIAN_RAM: &str = "median_ram_utilization_pct";
const MAX_RAM: &str = "max_ram_utilization_pct";
const COMPUTE_CREDITS: &str = "compute_credits";

const REQUIRED_COLUMNS: [&str; 8] = [
    PROJECT,
    WORKFLOW,
    JOB,
    RESOURCE_CLASS,
    MEDIAN_CPU,
    MAX_CPU,
    MEDIAN_RAM,
    MAX_RAM,
];

/// A job/resource-class pair whose utilization stayed below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnderusedJob {
    pub project_name: String,
    pub workflow_name: String,
    pub job: String,
    pub resource_class: String,
    pub avg_cpu: f64,
    pub max_cpu: f64,
    pub avg_ram: f64,
    pub max_ram: f64,
    pub count: usize,
    pub total_compute_credits: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnderusedReport {
    pub report: String,
    pub threshold: f64,
    pub underused: Vec<UnderusedJob>,
}

type GroupKey = (String, String, String, String);

#[derive(Default)]
struct Samples {
    rows: usize,
    median_cpu: Vec<f64>,
    max_cpu: Vec<f64>,
    median_ram: Vec<f64>,
    max_ram: Vec<f64>,
    credits: Vec<f64>,
}

/// Reads a usage export CSV and reports underused resource classes.
///
/// # Errors
///
/// [`UsageReportError::FileRead`] if the file cannot be opened, otherwise the
/// errors of [`analyze_usage_csv`]. No partial report is produced.
pub fn find_underused_resource_classes(
    csv_path: &Path,
    threshold: f64,
) -> Result<UnderusedReport, UsageReportError> {
    let file = File::open(csv_path).map_err(|source| UsageReportError::FileRead {
        path: csv_path.display().to_string(),
        source,
    })?;
    analyze_usage_csv(file, threshold)
}

/// Groups rows by (project, workflow, job, resource class) and keeps groups
/// whose four utilization averages are all strictly below `threshold`.
///
/// # Errors
///
/// [`UsageReportError::CsvParse`] for malformed CSV and
/// [`UsageReportError::Schema`] when a required column is missing.
pub fn analyze_usage_csv<R: Read>(
    reader: R,
    threshold: f64,
) -> Result<UnderusedReport, UsageReportError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(normalize_header).collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(UsageReportError::Schema { missing });
    }

    let column = |name: &str| headers.iter().position(|h| h == name);
    let idx = |name: &str| column(name).unwrap_or_default();
    let (project, workflow, job, resource_class) =
        (idx(PROJECT), idx(WORKFLOW), idx(JOB), idx(RESOURCE_CLASS));
    let (median_cpu, max_cpu, median_ram, max_ram) =
        (idx(MEDIAN_CPU), idx(MAX_CPU), idx(MEDIAN_RAM), idx(MAX_RAM));
    let credits = column(COMPUTE_CREDITS);

    let mut groups: BTreeMap<GroupKey, Samples> = BTreeMap::new();
    let mut rows = 0;
    for record in csv.records() {
        let record = record?;
        rows += 1;
        let text = |i: usize| record.get(i).unwrap_or_default().to_string();
        let number = |i: usize| record.get(i).and_then(parse_number);

        let samples = groups
            .entry((text(project), text(workflow), text(job), text(resource_class)))
            .or_default();
        samples.rows += 1;
        samples.median_cpu.extend(number(median_cpu));
        samples.max_cpu.extend(number(max_cpu));
        samples.median_ram.extend(number(median_ram));
        samples.max_ram.extend(number(max_ram));
        samples.credits.extend(credits.and_then(number));
    }
    debug!("Analyzed {rows} usage rows in {} groups", groups.len());

    let underused: Vec<UnderusedJob> = groups
        .into_iter()
        .filter_map(|(key, samples)| summarize(key, &samples, threshold))
        .collect();

    Ok(UnderusedReport {
        report: render_report(&underused, threshold),
        threshold,
        underused,
    })
}

fn summarize(key: GroupKey, samples: &Samples, threshold: f64) -> Option<UnderusedJob> {
    let avg_cpu = mean(&samples.median_cpu)?;
    let max_cpu = mean(&samples.max_cpu)?;
    let avg_ram = mean(&samples.median_ram)?;
    let max_ram = mean(&samples.max_ram)?;

    if ![avg_cpu, max_cpu, avg_ram, max_ram]
        .iter()
        .all(|v| v.is_finite() && *v < threshold)
    {
        return None;
    }

    let (project_name, workflow_name, job, resource_class) = key;
    Some(UnderusedJob {
        project_name,
        workflow_name,
        job,
        resource_class,
        avg_cpu: round2(avg_cpu),
        max_cpu: round2(max_cpu),
        avg_ram: round2(avg_ram),
        max_ram: round2(max_ram),
        count: samples.rows,
        total_compute_credits: round2(samples.credits.iter().sum()),
    })
}

/// Renders the report grouped by project then workflow. `underused` is
/// expected in the alphabetical order [`analyze_usage_csv`] produces.
pub fn render_report(underused: &[UnderusedJob], threshold: f64) -> String {
    if underused.is_empty() {
        return format!("No underused resource classes found (threshold: {threshold}%).");
    }

    let mut by_project: BTreeMap<&str, BTreeMap<&str, Vec<&UnderusedJob>>> = BTreeMap::new();
    for job in underused {
        by_project
            .entry(job.project_name.as_str())
            .or_default()
            .entry(job.workflow_name.as_str())
            .or_default()
            .push(job);
    }

    let mut report = format!("Underused resource classes (threshold: {threshold}%):\n\n");
    for (project, workflows) in by_project {
        let _ = writeln!(report, "Project: {project}");
        for (workflow, jobs) in workflows {
            let _ = writeln!(report, "  Workflow: {workflow}");
            report.push_str("    Job Name | Resource Class | #Runs | Total Compute Credits | Avg CPU% | Max CPU% | Avg RAM% | Max RAM%\n");
            report.push_str("    --------|---------------|-------|----------------------|----------|----------|----------|----------\n");
            for u in jobs {
                let _ = writeln!(
                    report,
                    "    {} | {} | {} | {} | {} | {} | {} | {}",
                    u.job,
                    u.resource_class,
                    u.count,
                    u.total_compute_credits,
                    u.avg_cpu,
                    u.max_cpu,
                    u.avg_ram,
                    u.max_ram
                );
            }
        }
        report.push('\n');
    }
    report
}

/// Trim, lowercase, and collapse whitespace runs to `_`.
fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let value = value.strip_suffix('%').unwrap_or(value);
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
