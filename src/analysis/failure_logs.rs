use log::{debug, info, warn};
use serde::Serialize;

use crate::batch::{batch_promises, BatchOptions};
use crate::client::types::{Pipeline, ProjectSlug};
use crate::client::{CircleCiClients, StepOutputApi};
use crate::error::{CciError, Result};

/// Per-stream character budget before the head of a log is cut.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepLog {
    pub step_name: String,
    pub output: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailureLogs {
    pub job_number: u64,
    pub job_name: String,
    pub steps: Vec<StepLog>,
}

/// Which pipeline to inspect. A number wins over a branch.
#[derive(Debug, Clone)]
pub struct FailureLogsRequest {
    pub slug: ProjectSlug,
    pub branch: Option<String>,
    pub pipeline_number: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FailureLogsOptions {
    pub batch: BatchOptions,
    pub max_output_chars: usize,
}

impl Default for FailureLogsOptions {
    fn default() -> Self {
        Self {
            batch: BatchOptions::new(5),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

/// A failed action waiting for its output, tagged with the job it belongs to.
struct FailedAction {
    job: usize,
    job_number: u64,
    step_name: String,
    task_index: u32,
    step_id: u32,
}

/// Collects the output of every failed step in a pipeline.
///
/// Jobs that never got a number (approvals, blocked jobs) are skipped. A
/// failed action whose output cannot be fetched is left out of its job.
///
/// # Errors
///
/// [`CciError::NotFound`] when the branch has no pipelines. Any error other
/// than a step output fetch propagates.
pub async fn get_job_logs(
    clients: &CircleCiClients,
    step_output: &StepOutputApi,
    request: &FailureLogsRequest,
    options: &FailureLogsOptions,
) -> Result<Vec<JobFailureLogs>> {
    let pipeline = resolve_pipeline(clients, request).await?;
    info!("Collecting failure logs for pipeline #{}", pipeline.number);

    let workflows = clients
        .workflows
        .get_pipeline_workflows(&pipeline.id, None)
        .await?;

    let jobs_api = &clients.jobs;
    let job_lists = batch_promises(
        workflows
            .iter()
            .map(|workflow| {
                let id = workflow.id.as_str();
                move || jobs_api.get_workflow_jobs(id, None)
            })
            .collect(),
        &options.batch,
    )
    .await?;

    let job_numbers: Vec<u64> = job_lists
        .into_iter()
        .flatten()
        .filter_map(|job| job.job_number)
        .collect();
    debug!(
        "{} numbered job(s) across {} workflow(s)",
        job_numbers.len(),
        workflows.len()
    );

    let details_api = &clients.job_details;
    let slug = &request.slug;
    let details = batch_promises(
        job_numbers
            .iter()
            .map(|&number| move || details_api.get_job_details(slug, number))
            .collect(),
        &options.batch,
    )
    .await?;

    let failed: Vec<FailedAction> = details
        .iter()
        .enumerate()
        .flat_map(|(job, detail)| {
            detail.steps.iter().flat_map(move |step| {
                step.actions
                    .iter()
                    .filter(|action| action.failed == Some(true))
                    .map(move |action| FailedAction {
                        job,
                        job_number: detail.build_num,
                        step_name: step.name.clone(),
                        task_index: action.index,
                        step_id: action.step,
                    })
            })
        })
        .collect();

    let max_chars = options.max_output_chars;
    let logs = batch_promises(
        failed
            .iter()
            .map(|action| move || fetch_step_log(step_output, slug, action, max_chars))
            .collect(),
        &options.batch,
    )
    .await?;

    let mut results: Vec<JobFailureLogs> = details
        .iter()
        .map(|detail| JobFailureLogs {
            job_number: detail.build_num,
            job_name: detail.workflows.job_name.clone(),
            steps: Vec::new(),
        })
        .collect();
    for (action, log) in failed.iter().zip(logs) {
        if let Some(log) = log {
            results[action.job].steps.push(log);
        }
    }

    Ok(results)
}

async fn resolve_pipeline(clients: &CircleCiClients, request: &FailureLogsRequest) -> Result<Pipeline> {
    if let Some(number) = request.pipeline_number {
        return clients
            .pipelines
            .get_pipeline_by_number(&request.slug, number)
            .await;
    }

    clients
        .pipelines
        .get_recent_pipelines(&request.slug, request.branch.as_deref())
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CciError::NotFound("Pipeline".to_string()))
}

async fn fetch_step_log(
    api: &StepOutputApi,
    slug: &ProjectSlug,
    action: &FailedAction,
    max_chars: usize,
) -> Result<Option<StepLog>> {
    match api
        .get_step_output(slug, action.job_number, action.task_index, action.step_id)
        .await
    {
        Ok(output) => Ok(Some(StepLog {
            step_name: action.step_name.clone(),
            output: truncate_head(&output.output, max_chars),
            error: truncate_head(&output.error, max_chars),
        })),
        Err(e) => {
            warn!(
                "Skipping output of step '{}' in job {}: {e}",
                action.step_name, action.job_number
            );
            Ok(None)
        }
    }
}

/// Keeps the last `max_chars` characters, behind a marker saying how much was cut.
pub fn truncate_head(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let dropped = total - max_chars;
    let start = text
        .char_indices()
        .nth(dropped)
        .map_or(text.len(), |(index, _)| index);
    format!(
        "[output truncated: showing last {max_chars} of {total} characters]\n{}",
        &text[start..]
    )
}
