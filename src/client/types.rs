use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::UrlParseError;

/// `{vcs}/{org}/{project}` key addressing a CircleCI project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectSlug(String);

impl ProjectSlug {
    pub fn new(vcs: &str, org: &str, project: &str) -> Self {
        Self(format!("{vcs}/{org}/{project}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The slug with every segment percent-encoded, ready to embed in a path.
    pub fn escaped(&self) -> String {
        self.0
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl FromStr for ProjectSlug {
    type Err = UrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().trim_matches('/').split('/').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(UrlParseError::InvalidProjectSlug(s.to_string()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for ProjectSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Pipelines

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Created,
    Errored,
    SetupPending,
    Setup,
    Pending,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub project_slug: ProjectSlug,
    pub number: u64,
    #[serde(default)]
    pub state: Option<PipelineState>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub vcs: Option<PipelineVcs>,
    #[serde(default)]
    pub trigger_parameters: Option<TriggerParameters>,
}

impl Pipeline {
    /// True when any of the commit identities the API has exposed equals `commit`.
    pub fn matches_commit(&self, commit: &str) -> bool {
        let github_app = self
            .trigger_parameters
            .as_ref()
            .and_then(|p| p.github_app.as_ref())
            .and_then(|p| p.commit_sha.as_deref());
        let git = self
            .trigger_parameters
            .as_ref()
            .and_then(|p| p.git.as_ref())
            .and_then(|p| p.checkout_sha.as_deref());
        let revision = self.vcs.as_ref().and_then(|v| v.revision.as_deref());

        [github_app, git, revision]
            .into_iter()
            .flatten()
            .any(|sha| sha == commit)
    }

    pub fn branch(&self) -> Option<&str> {
        self.vcs.as_ref().and_then(|v| v.branch.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineVcs {
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub origin_repository_url: Option<String>,
    #[serde(default)]
    pub commit: Option<Commit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerParameters {
    #[serde(default)]
    pub github_app: Option<GithubAppParameters>,
    #[serde(default)]
    pub git: Option<GitParameters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubAppParameters {
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitParameters {
    #[serde(default)]
    pub checkout_sha: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCreated {
    pub id: String,
    pub number: u64,
    #[serde(default)]
    pub state: Option<PipelineState>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// Workflows and jobs

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Running,
    NotRun,
    Failed,
    Error,
    Failing,
    OnHold,
    Canceled,
    Unauthorized,
    Blocked,
    Queued,
    NotRunning,
    InfrastructureFail,
    Timedout,
    TerminatedUnknown,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Error | Self::Failing | Self::InfrastructureFail | Self::Timedout
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        f.write_str(&text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub pipeline_id: String,
    pub project_slug: ProjectSlug,
    pub status: RunStatus,
    #[serde(default)]
    pub pipeline_number: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

/// A job as listed under a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Absent until the job has been scheduled.
    #[serde(default)]
    pub job_number: Option<u64>,
    pub name: String,
    pub status: RunStatus,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub project_slug: Option<ProjectSlug>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

/// A job fetched by number from the v2 API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectJob {
    pub number: u64,
    pub name: String,
    pub status: RunStatus,
    pub web_url: String,
    pub pipeline: PipelineRef,
    #[serde(default)]
    pub latest_workflow: Option<WorkflowRef>,
    #[serde(default)]
    pub executor: Option<Executor>,
    #[serde(default)]
    pub parallelism: Option<u32>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Executor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub resource_class: Option<String>,
}

/// Legacy (v1.1) job details: steps with their addressable actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    pub build_num: u64,
    pub steps: Vec<Step>,
    pub workflows: JobWorkflowInfo,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub vcs_revision: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWorkflowInfo {
    pub job_name: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub actions: Vec<Action>,
}

/// One parallel run of a step. `(index, step)` addresses its raw output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub index: u32,
    pub step: u32,
    /// `None` when the action did not run.
    pub failed: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    pub output: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RerunWorkflowRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_failed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ssh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerunWorkflowResponse {
    pub workflow_id: String,
}

// Tests and artifacts

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub classname: String,
    pub result: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub run_time: f64,
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    #[serde(default)]
    pub pretty_path: Option<String>,
    pub node_index: u32,
    pub url: String,
}

// Insights

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationMetrics {
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub max: f64,
    #[serde(default)]
    pub standard_deviation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub name: String,
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
    pub metrics: WorkflowMetricsSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetricsSummary {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub success_rate: f64,
    pub total_credits_used: f64,
    pub duration_metrics: DurationMetrics,
    #[serde(default)]
    pub mttr: Option<f64>,
    #[serde(default)]
    pub throughput: Option<f64>,
    #[serde(default)]
    pub total_recoveries: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetrics {
    pub name: String,
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
    pub metrics: JobMetricsSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetricsSummary {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub success_rate: f64,
    pub total_credits_used: f64,
    pub duration_metrics: DurationMetrics,
    #[serde(default)]
    pub throughput: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTestMetrics {
    pub average_test_count: f64,
    pub total_test_runs: u64,
    #[serde(default)]
    pub most_failed_tests: Vec<TestMetric>,
    #[serde(default)]
    pub most_failed_tests_extra: u64,
    #[serde(default)]
    pub slowest_tests: Vec<TestMetric>,
    #[serde(default)]
    pub slowest_tests_extra: u64,
    #[serde(default)]
    pub test_runs: Vec<TestRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMetric {
    pub test_name: String,
    pub job_name: String,
    pub failed_runs: u64,
    pub total_runs: u64,
    pub p95_duration: f64,
    #[serde(default)]
    pub flaky: bool,
    #[serde(default)]
    pub classname: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub pipeline_number: u64,
    pub workflow_id: String,
    pub success_rate: f64,
    pub test_counts: TestCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCounts {
    pub error: u64,
    pub failure: u64,
    pub skipped: u64,
    pub success: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakyTests {
    pub flaky_tests: Vec<FlakyTest>,
    pub total_flaky_tests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakyTest {
    pub job_number: u64,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub classname: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub times_flaked: Option<u64>,
    #[serde(default)]
    pub time_wasted: Option<f64>,
    #[serde(default)]
    pub file: Option<String>,
}

// Projects

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub slug: ProjectSlug,
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub organization_slug: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub vcs_info: Option<VcsInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsInfo {
    pub vcs_url: String,
    pub provider: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowedProject {
    pub name: String,
    pub slug: ProjectSlug,
    pub vcs_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

// Usage export

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageExportJobStart {
    pub usage_export_job_id: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageExportJobStatus {
    pub state: String,
    #[serde(default)]
    pub usage_export_job_id: Option<String>,
    #[serde(default)]
    pub download_urls: Option<Vec<String>>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

/// Lifecycle of a server-side usage export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageExportState {
    Created,
    Pending,
    Processing,
    Completed,
    /// `failed` and anything not recognised, with the raw state string.
    Other(String),
}

impl UsageExportState {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "created" => Self::Created,
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            _ => Self::Other(raw.to_string()),
        }
    }
}

impl UsageExportJobStatus {
    pub fn parsed_state(&self) -> UsageExportState {
        UsageExportState::from_raw(&self.state)
    }
}

// Deploys

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub release_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentVersion {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub environment_id: Option<String>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub job_number: Option<u64>,
    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploySettings {
    #[serde(default)]
    pub rollback_pipeline_definition_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub environment_name: String,
    pub component_name: String,
    pub current_version: String,
    pub target_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub id: String,
    pub rollback_type: String,
}

// Config validation

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ConfigError>,
    #[serde(default)]
    pub output_yaml: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigError {
    pub message: String,
}
