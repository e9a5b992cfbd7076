//! Parsing of CircleCI web-app URLs.
//!
//! The app addresses resources as
//! `.../pipelines/{vcs}/{org}/{project}[/{number}[/workflows/{id}[/jobs/{n}]]]`.
//! The project part is either a VCS slug (`gh/org/repo`) or the internal
//! `circleci/{orgId}/{projectId}` shape; both have three segments.

use url::Url;

use crate::client::types::ProjectSlug;
use crate::error::UrlParseError;

type Result<T> = std::result::Result<T, UrlParseError>;

const PIPELINES: &str = "pipelines";
const WORKFLOWS: &str = "workflows";
const JOBS: &str = "jobs";

fn segments(url: &str) -> Result<Vec<String>> {
    let parsed =
        Url::parse(url.trim()).map_err(|_| UrlParseError::InvalidFormat(url.to_string()))?;
    Ok(parsed
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| {
                    urlencoding::decode(s)
                        .map(|decoded| decoded.into_owned())
                        .unwrap_or_else(|_| s.to_string())
                })
                .collect()
        })
        .unwrap_or_default())
}

/// Segments following `marker`, or `None` if `marker` is absent.
fn after<'a>(segments: &'a [String], marker: &str) -> Option<&'a [String]> {
    segments
        .iter()
        .position(|s| s == marker)
        .map(|i| &segments[i + 1..])
}

/// Extracts `{vcs}/{org}/{project}` from a pipeline, workflow or job URL.
///
/// # Errors
///
/// [`UrlParseError::InvalidFormat`] if the URL has no `pipelines` segment,
/// [`UrlParseError::IncompleteProjectInfo`] if fewer than three segments follow it.
pub fn get_project_slug_from_url(url: &str) -> Result<ProjectSlug> {
    let segments = segments(url)?;
    let rest =
        after(&segments, PIPELINES).ok_or_else(|| UrlParseError::InvalidFormat(url.to_string()))?;

    match rest {
        [vcs, org, project, ..] => Ok(ProjectSlug::new(vcs, org, project)),
        _ => Err(UrlParseError::IncompleteProjectInfo(url.to_string())),
    }
}

/// The pipeline number, i.e. the fourth segment after `pipelines`.
pub fn get_pipeline_number_from_url(url: &str) -> Result<u64> {
    let segments = segments(url)?;
    let rest =
        after(&segments, PIPELINES).ok_or_else(|| UrlParseError::InvalidFormat(url.to_string()))?;

    rest.get(3)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| UrlParseError::MissingPipelineNumber(url.to_string()))
}

/// The job number from `.../jobs/{n}` or from a legacy
/// `https://circleci.com/{vcs}/{org}/{project}/{n}` job URL.
pub fn get_job_number_from_url(url: &str) -> Result<u64> {
    parse_job_url(url).map(|(_, number)| number)
}

/// Workflow id from `.../workflows/{id}`, including the short
/// `.../pipelines/workflows/{id}` shape.
pub fn get_workflow_id_from_url(url: &str) -> Result<String> {
    let segments = segments(url)?;
    after(&segments, WORKFLOWS)
        .and_then(|rest| rest.first())
        .cloned()
        .ok_or_else(|| UrlParseError::MissingWorkflowId(url.to_string()))
}

/// Project slug and job number of a job URL, app or legacy shape.
pub fn parse_job_url(url: &str) -> Result<(ProjectSlug, u64)> {
    let segments = segments(url)?;

    if segments.iter().any(|s| s == PIPELINES) {
        let slug = get_project_slug_from_url(url)?;
        let number = after(&segments, JOBS)
            .and_then(|rest| rest.first())
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| UrlParseError::MissingJobNumber(url.to_string()))?;
        return Ok((slug, number));
    }

    match segments.as_slice() {
        [vcs, org, project, number] => {
            let number = number
                .parse()
                .map_err(|_| UrlParseError::MissingJobNumber(url.to_string()))?;
            Ok((ProjectSlug::new(vcs, org, project), number))
        }
        _ => Err(UrlParseError::InvalidFormat(url.to_string())),
    }
}

/// The `branch` query parameter, if present and non-empty.
pub fn get_branch_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "branch")
        .map(|(_, value)| value.into_owned())
        .filter(|branch| !branch.is_empty())
}
