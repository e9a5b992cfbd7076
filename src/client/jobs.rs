use log::debug;

use super::http::HttpClient;
use super::pagination::{paginate, PaginationOptions};
use super::params::QueryParams;
use super::types::{Job, JobDetails, ProjectJob, ProjectSlug, StepOutput};
use crate::error::Result;

/// Jobs on the v2 API.
#[derive(Clone)]
pub struct JobsApi {
    http: HttpClient,
    pagination: PaginationOptions,
}

impl JobsApi {
    pub fn new(http: HttpClient, pagination: PaginationOptions) -> Self {
        Self { http, pagination }
    }

    /// Jobs of a workflow. Jobs not yet scheduled carry no `job_number`.
    pub async fn get_workflow_jobs(
        &self,
        workflow_id: &str,
        options: Option<&PaginationOptions>,
    ) -> Result<Vec<Job>> {
        let path = format!("/workflow/{}/job", urlencoding::encode(workflow_id));
        let params = QueryParams::new();
        let (path, params) = (path.as_str(), &params);

        paginate(options.unwrap_or(&self.pagination), move |token| {
            self.http.get_page(path, params, token, "workflow jobs")
        })
        .await
    }

    pub async fn get_job_by_number(&self, slug: &ProjectSlug, job_number: u64) -> Result<ProjectJob> {
        let path = format!("/project/{}/job/{job_number}", slug.escaped());
        self.http.get_json(&path, &QueryParams::new(), "job").await
    }
}

/// Legacy job details from `/api/v1.1`, the only source of step/action layout.
#[derive(Clone)]
pub struct JobDetailsApi {
    http: HttpClient,
}

impl JobDetailsApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn get_job_details(&self, slug: &ProjectSlug, job_number: u64) -> Result<JobDetails> {
        let path = format!("/project/{}/{job_number}", slug.escaped());
        self.http
            .get_json(&path, &QueryParams::new(), "job details")
            .await
    }
}

/// Raw step output from `/api/private`.
///
/// The transport handed in here is expected to carry a [`RateLimiter`]; each
/// call issues two throttled requests.
///
/// [`RateLimiter`]: super::rate_limit::RateLimiter
#[derive(Clone)]
pub struct StepOutputApi {
    http: HttpClient,
}

impl StepOutputApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Fetches stdout and stderr of one action, addressed by `(task_index, step_id)`.
    ///
    /// # Arguments
    ///
    /// * `task_index` - the action's `index` (parallel run)
    /// * `step_id` - the action's `step`
    pub async fn get_step_output(
        &self,
        slug: &ProjectSlug,
        job_number: u64,
        task_index: u32,
        step_id: u32,
    ) -> Result<StepOutput> {
        let base = format!("/output/raw/{}/{job_number}", slug.escaped());
        debug!("Fetching step output {task_index}/{step_id} of job {job_number}");

        let output = self
            .http
            .get_text(&format!("{base}/output/{task_index}/{step_id}"), &QueryParams::new())
            .await?;
        let error = self
            .http
            .get_text(&format!("{base}/error/{task_index}/{step_id}"), &QueryParams::new())
            .await?;

        Ok(StepOutput { output, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rate_limit::RateLimiter;
    use crate::client::test_support::transport;
    use serde_json::json;
    use std::time::Duration;

    fn slug() -> ProjectSlug {
        "gh/org/repo".parse().unwrap()
    }

    #[tokio::test]
    async fn workflow_jobs_tolerate_missing_job_number() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/workflow/w1/job")
            .with_body(
                json!({
                    "items": [
                        {"id": "j1", "job_number": 101, "name": "build", "status": "success", "type": "build"},
                        {"id": "j2", "name": "approve", "status": "on_hold", "type": "approval"}
                    ],
                    "next_page_token": null
                })
                .to_string(),
            )
            .create_async()
            .await;

        let api = JobsApi::new(transport(&server, "v2"), PaginationOptions::default());
        let jobs = api.get_workflow_jobs("w1", None).await.unwrap();

        assert_eq!(jobs[0].job_number, Some(101));
        assert_eq!(jobs[1].job_number, None);
        assert_eq!(jobs[1].kind.as_deref(), Some("approval"));
    }

    #[tokio::test]
    async fn job_by_number_reads_executor() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/project/gh/org/repo/job/7")
            .with_body(
                json!({
                    "number": 7,
                    "name": "test",
                    "status": "failed",
                    "web_url": "https://app.circleci.com/pipelines/gh/org/repo/1/workflows/w/jobs/7",
                    "pipeline": {"id": "p-1"},
                    "executor": {"type": "docker", "resource_class": "medium"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let api = JobsApi::new(transport(&server, "v2"), PaginationOptions::default());
        let job = api.get_job_by_number(&slug(), 7).await.unwrap();

        assert!(job.status.is_failed());
        assert_eq!(
            job.executor.and_then(|e| e.resource_class).as_deref(),
            Some("medium")
        );
    }

    #[tokio::test]
    async fn job_details_use_legacy_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1.1/project/gh/org/repo/7")
            .with_body(
                json!({
                    "build_num": 7,
                    "workflows": {"job_name": "test"},
                    "steps": [
                        {"name": "Checkout", "actions": [{"index": 0, "step": 101, "failed": null}]},
                        {"name": "Run tests", "actions": [{"index": 0, "step": 102, "failed": true}]}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let api = JobDetailsApi::new(transport(&server, "v1.1"));
        let details = api.get_job_details(&slug(), 7).await.unwrap();

        assert_eq!(details.workflows.job_name, "test");
        assert_eq!(details.steps[1].actions[0].failed, Some(true));
    }

    #[tokio::test]
    async fn step_output_fetches_output_and_error_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/private/output/raw/gh/org/repo/7/output/0/102")
            .with_body("npm test\n1 failing")
            .create_async()
            .await;
        server
            .mock("GET", "/api/private/output/raw/gh/org/repo/7/error/0/102")
            .with_body("")
            .create_async()
            .await;

        let api = StepOutputApi::new(transport(&server, "private"));
        let output = api.get_step_output(&slug(), 7, 0, 102).await.unwrap();

        assert_eq!(output.output, "npm test\n1 failing");
        assert_eq!(output.error, "");
    }

    #[tokio::test]
    async fn step_output_is_throttled_per_request() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/api/private/output/raw/".to_string()))
            .with_body("ok")
            .expect(2)
            .create_async()
            .await;

        let http = transport(&server, "private")
            .with_rate_limiter(RateLimiter::new(1, Duration::from_millis(50)));
        let api = StepOutputApi::new(http);
        let started = std::time::Instant::now();

        api.get_step_output(&slug(), 7, 0, 1).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
