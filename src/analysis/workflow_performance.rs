use std::cmp::Ordering;

use log::debug;
use serde::Serialize;

use crate::batch::{batch_promises, BatchOptions};
use crate::client::types::{JobMetrics, ProjectSlug, WorkflowMetrics};
use crate::client::{InsightsApi, InsightsFilter};
use crate::error::{CciError, Result};

pub const SLOWEST_JOBS: usize = 5;

const LOW_SUCCESS_PERCENT: f64 = 90.0;
const LONG_DURATION_SECS: f64 = 30.0 * 60.0;
const ALL_WORKFLOWS: &str = "All Workflows";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDuration {
    pub name: String,
    pub average_duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowPerformance {
    pub workflow_name: String,
    /// Percentage of successful runs; zero when nothing ran.
    pub success_rate: f64,
    pub average_duration_secs: f64,
    pub total_runs: u64,
    pub failed_runs: u64,
    /// Up to five jobs, slowest mean duration first.
    pub slowest_jobs: Vec<JobDuration>,
    pub recommendations: Vec<String>,
}

/// Summarises one workflow, or every workflow of the project when
/// `workflow_name` is `None`, from the Insights metrics.
///
/// # Errors
///
/// [`CciError::NotFound`] when `workflow_name` has no metrics in the window,
/// plus the first failing request.
pub async fn analyze_workflow_performance(
    insights: &InsightsApi,
    slug: &ProjectSlug,
    workflow_name: Option<&str>,
    filter: &InsightsFilter,
    batch: &BatchOptions,
) -> Result<WorkflowPerformance> {
    let mut workflows = insights
        .get_project_workflows_metrics(slug, filter, None)
        .await?;
    if let Some(name) = workflow_name {
        workflows.retain(|workflow| workflow.name == name);
        if workflows.is_empty() {
            return Err(CciError::NotFound(format!("Metrics for workflow {name}")));
        }
    }
    debug!("Analyzing {} workflow(s) of {slug}", workflows.len());

    let jobs = batch_promises(
        workflows
            .iter()
            .map(|workflow| {
                let name = workflow.name.as_str();
                move || insights.get_workflow_job_metrics(slug, name, filter, None)
            })
            .collect(),
        batch,
    )
    .await?;
    let jobs: Vec<JobMetrics> = jobs.into_iter().flatten().collect();

    Ok(summarize(
        workflow_name.unwrap_or(ALL_WORKFLOWS),
        &workflows,
        &jobs,
    ))
}

/// Folds workflow and job metrics into a single report.
///
/// Several workflows are combined by summing runs; the average duration is
/// weighted by each workflow's run count.
pub fn summarize(name: &str, workflows: &[WorkflowMetrics], jobs: &[JobMetrics]) -> WorkflowPerformance {
    let total_runs: u64 = workflows.iter().map(|w| w.metrics.total_runs).sum();
    let successful_runs: u64 = workflows.iter().map(|w| w.metrics.successful_runs).sum();
    let failed_runs: u64 = workflows.iter().map(|w| w.metrics.failed_runs).sum();

    let (success_rate, average_duration_secs) = match total_runs {
        0 => (0.0, 0.0),
        runs => {
            let weighted: f64 = workflows
                .iter()
                .map(|w| w.metrics.duration_metrics.mean * w.metrics.total_runs as f64)
                .sum();
            (
                successful_runs as f64 / runs as f64 * 100.0,
                weighted / runs as f64,
            )
        }
    };

    let mut slowest_jobs: Vec<JobDuration> = jobs
        .iter()
        .map(|job| JobDuration {
            name: job.name.clone(),
            average_duration_secs: job.metrics.duration_metrics.mean,
        })
        .collect();
    slowest_jobs.sort_by(|a, b| {
        b.average_duration_secs
            .partial_cmp(&a.average_duration_secs)
            .unwrap_or(Ordering::Equal)
    });
    slowest_jobs.truncate(SLOWEST_JOBS);

    let mut performance = WorkflowPerformance {
        workflow_name: name.to_string(),
        success_rate,
        average_duration_secs,
        total_runs,
        failed_runs,
        slowest_jobs,
        recommendations: Vec::new(),
    };
    performance.recommendations = recommendations(&performance);
    performance
}

fn minutes(seconds: f64) -> String {
    format!("{:.2} minutes", seconds / 60.0)
}

fn recommendations(performance: &WorkflowPerformance) -> Vec<String> {
    let mut advice = Vec::new();

    if performance.total_runs > 0 && performance.success_rate < LOW_SUCCESS_PERCENT {
        advice.push(format!(
            "Low success rate ({:.2}%). Investigate the most common failure points.",
            performance.success_rate
        ));
    }
    if performance.average_duration_secs > LONG_DURATION_SECS {
        advice.push(format!(
            "Long average duration ({}). Parallelize jobs or optimize slow steps.",
            minutes(performance.average_duration_secs)
        ));
    }
    if let Some(slowest) = performance.slowest_jobs.first() {
        advice.push(format!(
            "Slowest job: {} ({}). Optimize this job first.",
            slowest.name,
            minutes(slowest.average_duration_secs)
        ));
    }
    if performance.failed_runs > 0 {
        advice.push(format!(
            "{} failed runs detected. Review the failure patterns for common issues.",
            performance.failed_runs
        ));
    }

    advice
}
