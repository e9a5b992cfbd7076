use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::http::HttpClient;
use super::pagination::{paginate, PaginationOptions};
use super::params::QueryParams;
use super::types::{FlakyTests, JobMetrics, ProjectSlug, WorkflowMetrics, WorkflowTestMetrics};
use crate::error::{CciError, Result};

/// Time window the Insights API aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportingWindow {
    #[serde(rename = "last-24-hours")]
    Last24Hours,
    #[serde(rename = "last-7-days")]
    Last7Days,
    #[serde(rename = "last-30-days")]
    Last30Days,
    #[serde(rename = "last-60-days")]
    Last60Days,
    #[serde(rename = "last-90-days")]
    Last90Days,
}

impl ReportingWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last24Hours => "last-24-hours",
            Self::Last7Days => "last-7-days",
            Self::Last30Days => "last-30-days",
            Self::Last60Days => "last-60-days",
            Self::Last90Days => "last-90-days",
        }
    }
}

impl fmt::Display for ReportingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportingWindow {
    type Err = CciError;

    /// Accepts the API spelling or the short `24h`/`7d`/`30d`/`60d`/`90d` forms.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last-24-hours" | "24h" => Ok(Self::Last24Hours),
            "last-7-days" | "7d" => Ok(Self::Last7Days),
            "last-30-days" | "30d" => Ok(Self::Last30Days),
            "last-60-days" | "60d" => Ok(Self::Last60Days),
            "last-90-days" | "90d" => Ok(Self::Last90Days),
            other => Err(CciError::Config(format!("Unknown reporting window: {other}"))),
        }
    }
}

/// Branch and window scoping shared by the Insights endpoints.
#[derive(Debug, Clone, Default)]
pub struct InsightsFilter {
    pub branch: Option<String>,
    pub all_branches: bool,
    pub reporting_window: Option<ReportingWindow>,
}

impl InsightsFilter {
    fn params(&self, with_window: bool) -> QueryParams {
        let params = QueryParams::new().push_opt("branch", self.branch.as_deref());
        let params = if self.all_branches {
            params.push("all-branches", true)
        } else {
            params
        };
        if with_window {
            params.push_opt("reporting-window", self.reporting_window)
        } else {
            params
        }
    }
}

#[derive(Clone)]
pub struct InsightsApi {
    http: HttpClient,
    pagination: PaginationOptions,
}

impl InsightsApi {
    pub fn new(http: HttpClient, pagination: PaginationOptions) -> Self {
        Self { http, pagination }
    }

    /// Summary metrics for every workflow of a project.
    pub async fn get_project_workflows_metrics(
        &self,
        slug: &ProjectSlug,
        filter: &InsightsFilter,
        options: Option<&PaginationOptions>,
    ) -> Result<Vec<WorkflowMetrics>> {
        let path = format!("/insights/{}/workflows", slug.escaped());
        let params = filter.params(true);
        let (path, params) = (path.as_str(), &params);

        paginate(options.unwrap_or(&self.pagination), move |token| {
            self.http.get_page(path, params, token, "workflow metrics")
        })
        .await
    }

    /// Summary metrics for every job of one workflow.
    pub async fn get_workflow_job_metrics(
        &self,
        slug: &ProjectSlug,
        workflow_name: &str,
        filter: &InsightsFilter,
        options: Option<&PaginationOptions>,
    ) -> Result<Vec<JobMetrics>> {
        let path = format!(
            "/insights/{}/workflows/{}/jobs",
            slug.escaped(),
            urlencoding::encode(workflow_name)
        );
        let params = filter.params(true);
        let (path, params) = (path.as_str(), &params);

        paginate(options.unwrap_or(&self.pagination), move |token| {
            self.http.get_page(path, params, token, "job metrics")
        })
        .await
    }

    /// Test metrics of one workflow. This endpoint has no reporting window.
    pub async fn get_workflow_test_metrics(
        &self,
        slug: &ProjectSlug,
        workflow_name: &str,
        filter: &InsightsFilter,
    ) -> Result<WorkflowTestMetrics> {
        let path = format!(
            "/insights/{}/workflows/{}/test-metrics",
            slug.escaped(),
            urlencoding::encode(workflow_name)
        );
        self.http
            .get_json(&path, &filter.params(false), "test metrics")
            .await
    }

    pub async fn get_project_flaky_tests(&self, slug: &ProjectSlug) -> Result<FlakyTests> {
        let path = format!("/insights/{}/flaky-tests", slug.escaped());
        self.http
            .get_json(&path, &QueryParams::new(), "flaky tests")
            .await
    }
}
