use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use cci_tools::analysis::{
    analyze_workflow_performance, get_flaky_tests, get_job_logs, get_ssh_details,
    FailureLogsOptions, FailureLogsRequest, JobFailureLogs, WorkflowPerformance,
    DEFAULT_MAX_OUTPUT_CHARS,
};
use cci_tools::batch::BatchOptions;
use cci_tools::client::types::{ProjectSlug, RerunWorkflowRequest, RollbackRequest};
use cci_tools::client::{filter_artifacts, InsightsFilter, ReportingWindow};
use cci_tools::resolve::{
    get_branch_from_url, get_job_number_from_url, get_pipeline_number_from_url,
    get_project_slug_from_url, get_workflow_id_from_url, identify_project_slug, parse_job_url,
};
use cci_tools::usage::{
    find_underused_resource_classes, get_usage_api_data, normalize_user_date, DateBoundary,
    UsageExportOutcome, UsageExportRequest,
};
use cci_tools::{CircleCiClients, ClientConfig, PrivateClients};

use crate::config::{Config, OutputFormat};
use crate::output::{self, bright_green, bright_red, bright_yellow, cyan, dim, Spinner};

#[derive(Parser)]
#[command(name = "cci-tools")]
#[command(author, version, about = "CircleCI API toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// CircleCI personal API token
    #[arg(short, long, global = true, env = "CIRCLECI_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// CircleCI installation root (defaults to https://circleci.com)
    #[arg(long, global = true, env = "CIRCLECI_BASE_URL")]
    base_url: Option<String>,

    /// Config file (defaults to ./cci-tools.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// Write results to a file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

/// Ways to name a project; the first one given wins.
#[derive(Args)]
struct ProjectArgs {
    /// Project slug, e.g. gh/org/repo
    #[arg(short = 'P', long)]
    project: Option<String>,

    /// CircleCI app URL of a pipeline, workflow or job in the project
    #[arg(long)]
    url: Option<String>,

    /// Git remote of a followed project
    #[arg(long)]
    git_remote: Option<String>,
}

#[derive(Args)]
struct WorkflowArgs {
    #[arg(long, required_unless_present = "workflow_url")]
    workflow_id: Option<String>,

    /// CircleCI app URL of the workflow
    #[arg(long)]
    workflow_url: Option<String>,
}

#[derive(Args)]
struct InsightsArgs {
    #[arg(short, long)]
    branch: Option<String>,

    #[arg(long, default_value_t = false)]
    all_branches: bool,

    /// last-24-hours, last-7-days, ... or 24h/7d/30d/60d/90d
    #[arg(short, long)]
    window: Option<ReportingWindow>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recent pipelines, or one by commit or number
    Pipelines {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(short, long)]
        branch: Option<String>,

        #[arg(long, conflicts_with = "number")]
        commit: Option<String>,

        #[arg(short, long)]
        number: Option<u64>,

        /// Walk every page instead of the first one
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    Workflows {
        #[arg(long)]
        pipeline_id: String,
    },
    Jobs {
        #[command(flatten)]
        workflow: WorkflowArgs,
    },
    /// Output of every failed step in a pipeline
    FailureLogs {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(short, long)]
        branch: Option<String>,

        #[arg(short = 'n', long)]
        pipeline_number: Option<u64>,

        #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_CHARS)]
        max_chars: usize,

        #[arg(long, default_value_t = 5)]
        concurrency: usize,
    },
    Artifacts {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(short = 'j', long)]
        job_number: Option<u64>,

        /// Keep only artifacts whose path starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Test results of one job
    Tests {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(short = 'j', long)]
        job_number: Option<u64>,

        /// e.g. failure, success, skipped
        #[arg(long)]
        result: Option<String>,
    },
    FlakyTests {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long, default_value_t = 5)]
        concurrency: usize,
    },
    Metrics {
        #[command(subcommand)]
        command: MetricsCommand,
    },
    RerunWorkflow {
        #[command(flatten)]
        workflow: WorkflowArgs,

        #[arg(long, default_value_t = false)]
        from_failed: bool,

        #[arg(long, default_value_t = false)]
        enable_ssh: bool,
    },
    RunPipeline {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(short, long)]
        branch: String,

        /// Pipeline parameters as a JSON object
        #[arg(long)]
        parameters: Option<String>,
    },
    /// SSH command of a job rerun with SSH enabled
    Ssh {
        #[command(flatten)]
        workflow: WorkflowArgs,

        #[arg(short = 'j', long)]
        job_number: Option<u64>,
    },
    Deploys {
        #[command(subcommand)]
        command: DeploysCommand,
    },
    ValidateConfig {
        #[arg(default_value = ".circleci/config.yml")]
        file: PathBuf,
    },
    /// Show what a CircleCI app URL points at
    Resolve { url: String },
    /// Map a git remote to a followed project slug
    Identify { git_remote: String },
    /// Projects the authenticated user follows
    Projects,
    Usage {
        #[command(subcommand)]
        command: UsageCommand,
    },
}

#[derive(Subcommand)]
enum MetricsCommand {
    Workflows {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        filter: InsightsArgs,
    },
    Jobs {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long)]
        workflow: String,

        #[command(flatten)]
        filter: InsightsArgs,
    },
    Tests {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long)]
        workflow: String,

        #[command(flatten)]
        filter: InsightsArgs,
    },
    /// Success rate, duration, bottlenecks and advice for one or all workflows
    Performance {
        #[command(flatten)]
        project: ProjectArgs,

        /// Analyze only this workflow
        #[arg(long)]
        workflow: Option<String>,

        #[command(flatten)]
        filter: InsightsArgs,

        #[arg(long, default_value_t = 5)]
        concurrency: usize,
    },
}

#[derive(Subcommand)]
enum DeploysCommand {
    Environments {
        #[arg(long)]
        org_id: String,
    },
    Components {
        #[arg(long)]
        org_id: String,

        #[arg(long)]
        project_id: String,
    },
    Versions {
        #[arg(long)]
        component_id: String,

        #[arg(long)]
        environment_id: String,
    },
    Settings {
        #[arg(long)]
        project_id: String,
    },
    Rollback {
        #[arg(long)]
        project_id: String,

        #[arg(long)]
        environment_name: String,

        #[arg(long)]
        component_name: String,

        #[arg(long)]
        current_version: String,

        #[arg(long)]
        target_version: String,

        #[arg(long)]
        namespace: Option<String>,

        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
enum UsageCommand {
    /// Start a usage export job
    Start {
        #[arg(long)]
        org_id: String,

        /// e.g. 2025-06-01, "June 1, 2025", "30 days ago" or ISO-8601
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,
    },
    /// Check an export once and download it when ready
    Poll {
        #[arg(long)]
        org_id: String,

        #[arg(long)]
        job_id: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long)]
        output_dir: Option<String>,
    },
    /// Report resource classes with low average CPU and RAM
    Underused {
        file: PathBuf,

        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[derive(Serialize)]
struct ResolvedUrl {
    project_slug: Option<ProjectSlug>,
    pipeline_number: Option<u64>,
    workflow_id: Option<String>,
    job_number: Option<u64>,
    branch: Option<String>,
}

/// Settings resolved once per run from flags, env and the config file.
struct Session {
    config: Config,
    token: Option<String>,
    base_url: Option<String>,
    json: bool,
    pretty: bool,
    output: Option<PathBuf>,
}

impl Session {
    fn client_config(&self) -> Result<ClientConfig> {
        self.config
            .client_config(self.token.as_deref(), self.base_url.as_deref())
    }

    fn clients(&self) -> Result<CircleCiClients> {
        Ok(CircleCiClients::new(&self.client_config()?)?)
    }

    fn private_clients(&self) -> Result<PrivateClients> {
        Ok(PrivateClients::new(&self.client_config()?)?)
    }

    /// Writes `value` as JSON in JSON mode, otherwise the human rendering.
    fn emit<T: Serialize>(&self, value: &T, render: impl FnOnce(&T) -> String) -> Result<()> {
        let text = if self.json {
            output::to_json(value, self.pretty)?
        } else {
            render(value)
        };

        if let Some(path) = &self.output {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            info!("Results written to: {}", path.display());
        } else {
            println!("{text}");
        }
        Ok(())
    }

    async fn slug(&self, project: &ProjectArgs) -> Result<ProjectSlug> {
        if let Some(slug) = &project.project {
            return Ok(slug.parse()?);
        }
        if let Some(url) = &project.url {
            return match get_project_slug_from_url(url) {
                Ok(slug) => Ok(slug),
                Err(_) => Ok(parse_job_url(url)?.0),
            };
        }
        if let Some(remote) = &project.git_remote {
            let me = self.private_clients()?.me;
            return identify_project_slug(&me, remote)
                .await?
                .with_context(|| format!("No followed project matches {remote}"));
        }
        bail!("Name a project with --project, --url or --git-remote")
    }

    fn workflow_id(workflow: &WorkflowArgs) -> Result<String> {
        match (&workflow.workflow_id, &workflow.workflow_url) {
            (Some(id), _) => Ok(id.clone()),
            (None, Some(url)) => Ok(get_workflow_id_from_url(url)?),
            (None, None) => bail!("Pass --workflow-id or --workflow-url"),
        }
    }

    fn job_number(project: &ProjectArgs, job_number: Option<u64>) -> Result<u64> {
        match (job_number, &project.url) {
            (Some(number), _) => Ok(number),
            (None, Some(url)) => Ok(get_job_number_from_url(url)?),
            (None, None) => bail!("Pass --job-number or a job --url"),
        }
    }
}

fn insights_filter(args: &InsightsArgs) -> InsightsFilter {
    InsightsFilter {
        branch: args.branch.clone(),
        all_branches: args.all_branches,
        reporting_window: args.window,
    }
}

fn parse_parameters(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    raw.map(|text| {
        serde_json::from_str::<Map<String, Value>>(text)
            .context("--parameters must be a JSON object")
    })
    .transpose()
}

fn render_failure_logs(logs: &[JobFailureLogs]) -> String {
    let mut text = String::new();
    for job in logs {
        text.push_str(&format!(
            "{} {}\n",
            cyan(format!("Job #{}", job.job_number)),
            job.job_name
        ));
        if job.steps.is_empty() {
            text.push_str(&format!("  {}\n", dim("no failed step output")));
        }
        for step in &job.steps {
            text.push_str(&format!("  {}\n", bright_red(&step.step_name)));
            for line in step.output.lines().chain(step.error.lines()) {
                text.push_str(&format!("    {line}\n"));
            }
        }
    }
    text
}

fn render_performance(report: &WorkflowPerformance) -> String {
    let mut text = format!(
        "{}\n  {:<16} {:.2}%\n  {:<16} {:.2} minutes\n  {:<16} {}\n  {:<16} {}\n",
        cyan(&report.workflow_name),
        dim("success rate"),
        report.success_rate,
        dim("avg duration"),
        report.average_duration_secs / 60.0,
        dim("total runs"),
        report.total_runs,
        dim("failed runs"),
        report.failed_runs,
    );
    if !report.slowest_jobs.is_empty() {
        text.push_str(&format!("{}\n", output::slowest_jobs_table(&report.slowest_jobs)));
    }
    for advice in &report.recommendations {
        text.push_str(&format!("{} {advice}\n", bright_yellow("›")));
    }
    text
}

fn render_usage_outcome(outcome: &UsageExportOutcome) -> String {
    match outcome {
        UsageExportOutcome::Started { job_id } => format!(
            "Usage export started: {}\nPoll again with --job-id {job_id} in a few minutes.",
            bright_green(job_id)
        ),
        UsageExportOutcome::StillProcessing { job_id, state } => {
            format!("Usage export {job_id} is still {state}; poll again later.")
        }
        UsageExportOutcome::Downloaded { path } => {
            format!("Usage data saved to {}", bright_green(path.display()))
        }
    }
}

impl Cli {
    fn session(&self) -> Result<Session> {
        let config = Config::load(self.config.as_deref())?;
        let json = self.json || config.output.format == OutputFormat::Json;
        let pretty = self.pretty || config.output.pretty;
        Ok(Session {
            config,
            token: self.token.clone(),
            base_url: self.base_url.clone(),
            json,
            pretty,
            output: self.output.clone(),
        })
    }

    pub async fn execute(&self) -> Result<()> {
        let session = self.session()?;

        match &self.command {
            Commands::Pipelines {
                project,
                branch,
                commit,
                number,
                all,
            } => {
                let slug = session.slug(project).await?;
                let api = session.clients()?.pipelines;
                let branch = branch.as_deref();
                let pipelines = match (number, commit) {
                    (Some(n), _) => vec![api.get_pipeline_by_number(&slug, *n).await?],
                    (None, Some(sha)) => api
                        .get_pipeline_by_commit(&slug, branch, sha, None)
                        .await?
                        .into_iter()
                        .collect(),
                    (None, None) if *all => api.get_pipelines_by_branch(&slug, branch, None).await?,
                    (None, None) => api.get_recent_pipelines(&slug, branch).await?,
                };
                session.emit(&pipelines, |p| output::pipelines_table(p).to_string())
            }
            Commands::Workflows { pipeline_id } => {
                let workflows = session
                    .clients()?
                    .workflows
                    .get_pipeline_workflows(pipeline_id, None)
                    .await?;
                session.emit(&workflows, |w| output::workflows_table(w).to_string())
            }
            Commands::Jobs { workflow } => {
                let id = Session::workflow_id(workflow)?;
                let jobs = session.clients()?.jobs.get_workflow_jobs(&id, None).await?;
                session.emit(&jobs, |j| output::jobs_table(j).to_string())
            }
            Commands::FailureLogs {
                project,
                branch,
                pipeline_number,
                max_chars,
                concurrency,
            } => {
                let slug = session.slug(project).await?;
                let url_pipeline = project
                    .url
                    .as_deref()
                    .and_then(|url| get_pipeline_number_from_url(url).ok());
                let url_branch = project.url.as_deref().and_then(get_branch_from_url);
                let request = FailureLogsRequest {
                    slug,
                    branch: branch.clone().or(url_branch),
                    pipeline_number: pipeline_number.or(url_pipeline),
                };
                let options = FailureLogsOptions {
                    batch: BatchOptions::new(*concurrency),
                    max_output_chars: *max_chars,
                };

                let spinner = Spinner::start("Collecting failed step output");
                let result = get_job_logs(
                    &session.clients()?,
                    &session.private_clients()?.step_output,
                    &request,
                    &options,
                )
                .await;
                let logs = match result {
                    Ok(logs) => {
                        spinner.finish(format!("Collected logs for {} job(s)", logs.len()));
                        logs
                    }
                    Err(e) => {
                        spinner.fail("Collecting failed step output");
                        return Err(e.into());
                    }
                };
                session.emit(&logs, |l| render_failure_logs(l))
            }
            Commands::Artifacts {
                project,
                job_number,
                prefix,
            } => {
                let slug = session.slug(project).await?;
                let number = Session::job_number(project, *job_number)?;
                let artifacts = session
                    .clients()?
                    .artifacts
                    .get_all_job_artifacts(&slug, number, None)
                    .await?;
                let artifacts = filter_artifacts(artifacts, prefix.as_deref());
                session.emit(&artifacts, |a| output::artifacts_table(a).to_string())
            }
            Commands::Tests {
                project,
                job_number,
                result,
            } => {
                let slug = session.slug(project).await?;
                let number = Session::job_number(project, *job_number)?;
                let tests = session
                    .clients()?
                    .job_tests
                    .get_job_tests(&slug, number, result.as_deref(), None)
                    .await?;
                session.emit(&tests, |t| output::tests_table(t).to_string())
            }
            Commands::FlakyTests {
                project,
                concurrency,
            } => {
                let slug = session.slug(project).await?;
                let clients = session.clients()?;
                let spinner = Spinner::start("Fetching flaky test results");
                let tests = get_flaky_tests(
                    &clients.insights,
                    &clients.job_tests,
                    &slug,
                    &BatchOptions::new(*concurrency),
                )
                .await?;
                spinner.finish(format!("Fetched {} test result(s)", tests.len()));
                session.emit(&tests, |t| output::tests_table(t).to_string())
            }
            Commands::Metrics { command } => self.execute_metrics(&session, command).await,
            Commands::RerunWorkflow {
                workflow,
                from_failed,
                enable_ssh,
            } => {
                let id = Session::workflow_id(workflow)?;
                let request = RerunWorkflowRequest {
                    from_failed: from_failed.then_some(true),
                    enable_ssh: enable_ssh.then_some(true),
                    jobs: None,
                };
                let rerun = session
                    .clients()?
                    .workflows
                    .rerun_workflow(&id, &request)
                    .await?;
                session.emit(&rerun, |r| {
                    format!("New workflow: {}", bright_green(&r.workflow_id))
                })
            }
            Commands::RunPipeline {
                project,
                branch,
                parameters,
            } => {
                let slug = session.slug(project).await?;
                let parameters = parse_parameters(parameters.as_deref())?;
                let created = session
                    .clients()?
                    .pipelines
                    .trigger_pipeline(&slug, branch, parameters)
                    .await?;
                session.emit(&created, |c| {
                    format!("Triggered pipeline #{} ({})", bright_green(c.number), c.id)
                })
            }
            Commands::Ssh {
                workflow,
                job_number,
            } => {
                let id = Session::workflow_id(workflow)?;
                let details = get_ssh_details(
                    &session.clients()?,
                    &session.private_clients()?.step_output,
                    &id,
                    *job_number,
                )
                .await?;
                session.emit(&details, |d| match d {
                    Some(d) => format!(
                        "$ {}\n\nJob: {} (#{})",
                        bright_green(&d.command),
                        d.job_name,
                        d.job_number
                    ),
                    None => "No SSH-enabled job found yet. Rerun the workflow with --enable-ssh \
                             and try again once the job has started."
                        .to_string(),
                })
            }
            Commands::Deploys { command } => self.execute_deploys(&session, command).await,
            Commands::ValidateConfig { file } => {
                let yaml = read_text(file)?;
                let validation = session
                    .clients()?
                    .config_validation
                    .validate_config(&yaml)
                    .await?;
                session.emit(&validation, |v| {
                    if v.valid {
                        bright_green("Config is valid").to_string()
                    } else {
                        v.errors
                            .iter()
                            .map(|e| format!("{} {}", bright_red("✗"), e.message))
                            .collect::<Vec<_>>()
                            .join("\n")
                    }
                })
            }
            Commands::Resolve { url } => {
                let resolved = ResolvedUrl {
                    project_slug: get_project_slug_from_url(url)
                        .or_else(|_| parse_job_url(url).map(|(slug, _)| slug))
                        .ok(),
                    pipeline_number: get_pipeline_number_from_url(url).ok(),
                    workflow_id: get_workflow_id_from_url(url).ok(),
                    job_number: get_job_number_from_url(url).ok(),
                    branch: get_branch_from_url(url),
                };
                session.emit(&resolved, |r| {
                    let row = |label: &str, value: Option<String>| {
                        format!("{:<16} {}", dim(label), value.unwrap_or_else(|| "-".to_string()))
                    };
                    [
                        row("project", r.project_slug.as_ref().map(ToString::to_string)),
                        row("pipeline", r.pipeline_number.map(|n| n.to_string())),
                        row("workflow", r.workflow_id.clone()),
                        row("job", r.job_number.map(|n| n.to_string())),
                        row("branch", r.branch.clone()),
                    ]
                    .join("\n")
                })
            }
            Commands::Identify { git_remote } => {
                let me = session.private_clients()?.me;
                let slug = identify_project_slug(&me, git_remote).await?;
                session.emit(&slug, |s| match s {
                    Some(slug) => slug.to_string(),
                    None => format!("No followed project matches {git_remote}"),
                })
            }
            Commands::Projects => {
                let projects = session
                    .private_clients()?
                    .me
                    .get_followed_projects(None)
                    .await?;
                session.emit(&projects, |p| output::projects_table(p).to_string())
            }
            Commands::Usage { command } => self.execute_usage(&session, command).await,
        }
    }

    async fn execute_metrics(&self, session: &Session, command: &MetricsCommand) -> Result<()> {
        let insights = session.clients()?.insights;
        match command {
            MetricsCommand::Workflows { project, filter } => {
                let slug = session.slug(project).await?;
                let metrics = insights
                    .get_project_workflows_metrics(&slug, &insights_filter(filter), None)
                    .await?;
                session.emit(&metrics, |m| output::workflow_metrics_table(m).to_string())
            }
            MetricsCommand::Jobs {
                project,
                workflow,
                filter,
            } => {
                let slug = session.slug(project).await?;
                let metrics = insights
                    .get_workflow_job_metrics(&slug, workflow, &insights_filter(filter), None)
                    .await?;
                session.emit(&metrics, |m| output::job_metrics_table(m).to_string())
            }
            MetricsCommand::Tests {
                project,
                workflow,
                filter,
            } => {
                let slug = session.slug(project).await?;
                let metrics = insights
                    .get_workflow_test_metrics(&slug, workflow, &insights_filter(filter))
                    .await?;
                session.emit(&metrics, |m| output::test_metrics_table(m).to_string())
            }
            MetricsCommand::Performance {
                project,
                workflow,
                filter,
                concurrency,
            } => {
                let slug = session.slug(project).await?;
                let spinner = Spinner::start("Analyzing workflow performance");
                let report = analyze_workflow_performance(
                    &insights,
                    &slug,
                    workflow.as_deref(),
                    &insights_filter(filter),
                    &BatchOptions::new(*concurrency),
                )
                .await?;
                spinner.finish(format!("Analyzed {} run(s)", report.total_runs));
                session.emit(&report, render_performance)
            }
        }
    }

    async fn execute_deploys(&self, session: &Session, command: &DeploysCommand) -> Result<()> {
        let deploys = session.clients()?.deploys;
        match command {
            DeploysCommand::Environments { org_id } => {
                let environments = deploys.fetch_environments(org_id).await?;
                session.emit(&environments, |e| output::environments_table(e).to_string())
            }
            DeploysCommand::Components { org_id, project_id } => {
                let components = deploys.fetch_project_components(org_id, project_id).await?;
                session.emit(&components, |c| output::components_table(c).to_string())
            }
            DeploysCommand::Versions {
                component_id,
                environment_id,
            } => {
                let versions = deploys
                    .fetch_component_versions(component_id, environment_id)
                    .await?;
                session.emit(&versions, |v| output::versions_table(v).to_string())
            }
            DeploysCommand::Settings { project_id } => {
                let settings = deploys.fetch_project_deploy_settings(project_id).await?;
                session.emit(&settings, |s| match &s.rollback_pipeline_definition_id {
                    Some(id) => format!("Rollback pipeline definition: {id}"),
                    None => "No rollback pipeline configured".to_string(),
                })
            }
            DeploysCommand::Rollback {
                project_id,
                environment_name,
                component_name,
                current_version,
                target_version,
                namespace,
                reason,
            } => {
                let request = RollbackRequest {
                    environment_name: environment_name.clone(),
                    component_name: component_name.clone(),
                    current_version: current_version.clone(),
                    target_version: target_version.clone(),
                    namespace: namespace.clone(),
                    reason: reason.clone(),
                    parameters: None,
                };
                let rollback = deploys.run_rollback_pipeline(project_id, &request).await?;
                session.emit(&rollback, |r| {
                    format!("Rollback {} started ({})", bright_green(&r.id), r.rollback_type)
                })
            }
        }
    }

    async fn execute_usage(&self, session: &Session, command: &UsageCommand) -> Result<()> {
        match command {
            UsageCommand::Start { org_id, start, end } => {
                let request = UsageExportRequest {
                    org_id: org_id.clone(),
                    start_date: normalize_user_date(start, DateBoundary::Start)?,
                    end_date: normalize_user_date(end, DateBoundary::End)?,
                    job_id: None,
                    output_dir: self.usage_output_dir(session, None),
                };
                let outcome = get_usage_api_data(&session.clients()?.usage, &request).await?;
                session.emit(&outcome, render_usage_outcome)
            }
            UsageCommand::Poll {
                org_id,
                job_id,
                start,
                end,
                output_dir,
            } => {
                let request = UsageExportRequest {
                    org_id: org_id.clone(),
                    start_date: normalize_user_date(start, DateBoundary::Start)?,
                    end_date: normalize_user_date(end, DateBoundary::End)?,
                    job_id: Some(job_id.clone()),
                    output_dir: self.usage_output_dir(session, output_dir.as_deref()),
                };
                let outcome = get_usage_api_data(&session.clients()?.usage, &request).await?;
                session.emit(&outcome, render_usage_outcome)
            }
            UsageCommand::Underused { file, threshold } => {
                let threshold = threshold.unwrap_or(session.config.usage.threshold);
                let report = find_underused_resource_classes(file, threshold)?;
                session.emit(&report, |r| r.report.clone())
            }
        }
    }

    fn usage_output_dir(&self, session: &Session, flag: Option<&str>) -> String {
        flag.map(ToString::to_string)
            .or_else(|| session.config.usage.output_dir.clone())
            .unwrap_or_else(|| ".".to_string())
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cci_tools::analysis::StepLog;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_usage_command() {
        let cli = Cli::try_parse_from([
            "cci-tools", "--json", "usage", "underused", "usage.csv", "--threshold", "25",
        ])
        .unwrap();

        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Usage {
                command: UsageCommand::Underused { threshold: Some(t), .. }
            } if t == 25.0
        ));
    }

    #[test]
    fn reporting_window_accepts_short_form() {
        let cli = Cli::try_parse_from([
            "cci-tools", "metrics", "workflows", "-P", "gh/org/repo", "--window", "7d",
        ])
        .unwrap();

        let Commands::Metrics {
            command: MetricsCommand::Workflows { filter, .. },
        } = cli.command
        else {
            panic!("expected metrics workflows");
        };
        assert_eq!(filter.window, Some(ReportingWindow::Last7Days));
    }

    #[test]
    fn parameters_must_be_an_object() {
        assert!(parse_parameters(Some(r#"{"deploy": true}"#)).unwrap().is_some());
        assert!(parse_parameters(Some("[1, 2]")).is_err());
        assert!(parse_parameters(None).unwrap().is_none());
    }

    #[test]
    fn failure_logs_render_step_output_lines() {
        let text = render_failure_logs(&[JobFailureLogs {
            job_number: 7,
            job_name: "test".to_string(),
            steps: vec![StepLog {
                step_name: "Run tests".to_string(),
                output: "line one\nline two".to_string(),
                error: String::new(),
            }],
        }]);

        assert!(text.contains("test"));
        assert!(text.contains("    line one\n    line two\n"));
    }

    #[test]
    fn performance_report_lists_advice() {
        let report = WorkflowPerformance {
            workflow_name: "build".to_string(),
            success_rate: 80.0,
            average_duration_secs: 600.0,
            total_runs: 10,
            failed_runs: 2,
            slowest_jobs: Vec::new(),
            recommendations: vec!["2 failed runs detected.".to_string()],
        };

        let text = render_performance(&report);

        assert!(text.contains("80.00%"));
        assert!(text.contains("10.00 minutes"));
        assert!(text.contains("2 failed runs detected."));
    }

    #[test]
    fn parses_projects_and_performance_commands() {
        let cli = Cli::try_parse_from(["cci-tools", "projects"]).unwrap();
        assert!(matches!(cli.command, Commands::Projects));

        let cli = Cli::try_parse_from([
            "cci-tools", "metrics", "performance", "-P", "gh/org/repo", "--workflow", "build",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Metrics {
                command: MetricsCommand::Performance { workflow: Some(ref w), concurrency: 5, .. }
            } if w == "build"
        ));
    }

    #[test]
    fn workflow_id_comes_from_url() {
        let args = WorkflowArgs {
            workflow_id: None,
            workflow_url: Some(
                "https://app.circleci.com/pipelines/gh/org/repo/12/workflows/abc-123".to_string(),
            ),
        };
        assert_eq!(Session::workflow_id(&args).unwrap(), "abc-123");
    }
}
