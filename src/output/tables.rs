use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};
use serde::Serialize;

use cci_tools::analysis::JobDuration;
use cci_tools::client::types::{
    Artifact, Component, ComponentVersion, Environment, FollowedProject, Job, JobMetrics,
    Pipeline, RunStatus, TestResult, Workflow, WorkflowMetrics, WorkflowTestMetrics,
};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Insights report rates as fractions; shown as percentages.
pub fn color_coded_success_cell(rate: f64) -> Cell {
    let percent = rate * 100.0;
    let text = format!("{percent:.1}%");
    if percent > 80.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if percent >= 50.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn color_coded_duration_cell(seconds: f64) -> Cell {
    let minutes = seconds / 60.0;
    let text = format!("{minutes:.1}min");
    if minutes <= 10.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if minutes <= 15.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn status_cell(status: &RunStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        RunStatus::Success => cell.fg(TableColor::Green),
        s if s.is_failed() => cell.fg(TableColor::Red),
        _ => cell.fg(TableColor::Yellow),
    }
}

/// Lower-case wire name of a serde enum, e.g. `setup-pending`.
fn wire_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_default()
}

fn or_dash(value: Option<impl ToString>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn pipelines_table(pipelines: &[Pipeline]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["#", "State", "Branch", "Created", "ID"]);
    for pipeline in pipelines {
        table.add_row(vec![
            Cell::new(pipeline.number),
            Cell::new(or_dash(pipeline.state.as_ref().map(wire_name))),
            Cell::new(or_dash(pipeline.branch())),
            Cell::new(or_dash(pipeline.created_at.map(|t| t.format("%Y-%m-%d %H:%M")))),
            Cell::new(&pipeline.id),
        ]);
    }
    table
}

pub fn workflows_table(workflows: &[Workflow]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Name", "Status", "Pipeline #", "ID"]);
    for workflow in workflows {
        table.add_row(vec![
            Cell::new(&workflow.name),
            status_cell(&workflow.status),
            Cell::new(or_dash(workflow.pipeline_number)),
            Cell::new(&workflow.id),
        ]);
    }
    table
}

pub fn jobs_table(jobs: &[Job]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["#", "Name", "Status", "Type"]);
    for job in jobs {
        table.add_row(vec![
            Cell::new(or_dash(job.job_number)),
            Cell::new(&job.name),
            status_cell(&job.status),
            Cell::new(or_dash(job.kind.as_deref())),
        ]);
    }
    table
}

pub fn tests_table(tests: &[TestResult]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Result", "Class", "Name", "Time"]);
    for test in tests {
        let result = Cell::new(&test.result);
        let result = match test.result.as_str() {
            "success" => result.fg(TableColor::Green),
            "failure" | "error" => result.fg(TableColor::Red),
            _ => result.fg(TableColor::Yellow),
        };
        table.add_row(vec![
            result,
            Cell::new(&test.classname),
            Cell::new(&test.name),
            Cell::new(format!("{:.2}s", test.run_time)),
        ]);
    }
    table
}

pub fn artifacts_table(artifacts: &[Artifact]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Node", "Path", "URL"]);
    for artifact in artifacts {
        table.add_row(vec![
            Cell::new(artifact.node_index),
            Cell::new(&artifact.path),
            Cell::new(&artifact.url),
        ]);
    }
    table
}

pub fn workflow_metrics_table(metrics: &[WorkflowMetrics]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Workflow", "Runs", "Success", "Median", "P95", "Credits"]);
    for workflow in metrics {
        let m = &workflow.metrics;
        table.add_row(vec![
            Cell::new(&workflow.name),
            Cell::new(m.total_runs),
            color_coded_success_cell(m.success_rate),
            color_coded_duration_cell(m.duration_metrics.median),
            color_coded_duration_cell(m.duration_metrics.p95),
            Cell::new(format!("{:.0}", m.total_credits_used)),
        ]);
    }
    table
}

pub fn job_metrics_table(metrics: &[JobMetrics]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Job", "Runs", "Success", "Median", "P95", "Credits"]);
    for job in metrics {
        let m = &job.metrics;
        table.add_row(vec![
            Cell::new(&job.name),
            Cell::new(m.total_runs),
            color_coded_success_cell(m.success_rate),
            color_coded_duration_cell(m.duration_metrics.median),
            color_coded_duration_cell(m.duration_metrics.p95),
            Cell::new(format!("{:.0}", m.total_credits_used)),
        ]);
    }
    table
}

pub fn test_metrics_table(metrics: &WorkflowTestMetrics) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Most failed test", "Job", "Failed", "Runs", "Flaky"]);
    for test in &metrics.most_failed_tests {
        table.add_row(vec![
            Cell::new(&test.test_name),
            Cell::new(&test.job_name),
            Cell::new(test.failed_runs).fg(TableColor::Red),
            Cell::new(test.total_runs),
            Cell::new(if test.flaky { "yes" } else { "" }),
        ]);
    }
    table
}

pub fn environments_table(environments: &[Environment]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Environment", "ID"]);
    for environment in environments {
        table.add_row(vec![Cell::new(&environment.name), Cell::new(&environment.id)]);
    }
    table
}

pub fn components_table(components: &[Component]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Component", "Releases", "ID"]);
    for component in components {
        table.add_row(vec![
            Cell::new(&component.name),
            Cell::new(or_dash(component.release_count)),
            Cell::new(&component.id),
        ]);
    }
    table
}

pub fn versions_table(versions: &[ComponentVersion]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Version", "Live", "Namespace", "Deployed", "Job #"]);
    for version in versions {
        let live = if version.is_live {
            Cell::new("live").fg(TableColor::Green)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(&version.name),
            live,
            Cell::new(or_dash(version.namespace.as_deref())),
            Cell::new(or_dash(version.last_deployed_at.map(|t| t.format("%Y-%m-%d %H:%M")))),
            Cell::new(or_dash(version.job_number)),
        ]);
    }
    table
}

pub fn projects_table(projects: &[FollowedProject]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Project", "Slug", "VCS", "Default branch"]);
    for project in projects {
        table.add_row(vec![
            Cell::new(&project.name),
            Cell::new(&project.slug),
            Cell::new(&project.vcs_type),
            Cell::new(or_dash(project.default_branch.as_deref())),
        ]);
    }
    table
}

pub fn slowest_jobs_table(jobs: &[JobDuration]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Slowest job", "Mean"]);
    for job in jobs {
        table.add_row(vec![
            Cell::new(&job.name),
            color_coded_duration_cell(job.average_duration_secs),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use cci_tools::client::types::PipelineState;

    #[test]
    fn wire_name_uses_serde_spelling() {
        assert_eq!(wire_name(&PipelineState::SetupPending), "setup-pending");
        assert_eq!(wire_name(&RunStatus::OnHold), "on_hold");
    }

    #[test]
    fn pipeline_rows_fill_missing_fields_with_dash() {
        let pipeline: Pipeline = serde_json::from_value(serde_json::json!({
            "id": "p1", "project_slug": "gh/org/repo", "number": 12
        }))
        .unwrap();

        let rendered = pipelines_table(&[pipeline]).to_string();

        assert!(rendered.contains("12"));
        assert!(rendered.contains("p1"));
        assert!(rendered.contains('-'));
    }

    #[test]
    fn projects_table_lists_slug_and_branch() {
        let project: FollowedProject = serde_json::from_value(serde_json::json!({
            "name": "repo", "slug": "gh/org/repo", "vcs_type": "github", "default_branch": "main"
        }))
        .unwrap();

        let rendered = projects_table(&[project]).to_string();

        assert!(rendered.contains("gh/org/repo"));
        assert!(rendered.contains("main"));
    }

    #[test]
    fn success_rate_is_rendered_as_percent() {
        assert_eq!(color_coded_success_cell(0.955).content(), "95.5%");
    }
}
