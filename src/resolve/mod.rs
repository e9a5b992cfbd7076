mod app_url;
mod git_remote;

use std::future::Future;

use log::debug;

pub use self::git_remote::{parse_git_remote, GitRemote};
pub use self::app_url::{
    get_branch_from_url, get_job_number_from_url, get_pipeline_number_from_url,
    get_project_slug_from_url, get_workflow_id_from_url, parse_job_url,
};

use crate::client::types::{FollowedProject, ProjectSlug};
use crate::client::MeApi;
use crate::error::{Result, UrlParseError};

/// Known VCS hosts: (host, slug prefix, `vcs_type` reported by the API).
const VCS_HOSTS: &[(&str, &str, &str)] = &[
    ("github.com", "gh", "github"),
    ("bitbucket.org", "bb", "bitbucket"),
];

/// Where the followed-projects directory comes from.
pub trait FollowedProjectsSource {
    fn followed_projects(&self) -> impl Future<Output = Result<Vec<FollowedProject>>>;
}

impl FollowedProjectsSource for MeApi {
    fn followed_projects(&self) -> impl Future<Output = Result<Vec<FollowedProject>>> {
        self.get_followed_projects(None)
    }
}

/// Slug prefix and API `vcs_type` for a git host.
pub fn vcs_for_host(host: &str) -> Option<(&'static str, &'static str)> {
    let host = host.to_lowercase();
    VCS_HOSTS
        .iter()
        .find(|(known, _, _)| *known == host)
        .map(|(_, prefix, vcs_type)| (*prefix, *vcs_type))
}

/// Maps a git remote to the slug of a followed project.
///
/// Returns `Ok(None)` when no followed project matches; that is an expected
/// outcome and the caller should ask for more input.
///
/// # Errors
///
/// Fails when resolution cannot even be attempted: a malformed remote
/// ([`UrlParseError::InvalidGitRemote`]) or an unknown host
/// ([`UrlParseError::UnsupportedVcs`]). Errors of `source` propagate.
pub async fn identify_project_slug<S: FollowedProjectsSource>(
    source: &S,
    git_remote_url: &str,
) -> Result<Option<ProjectSlug>> {
    let remote = parse_git_remote(git_remote_url)?;
    let (prefix, vcs_type) = vcs_for_host(&remote.host)
        .ok_or_else(|| UrlParseError::UnsupportedVcs(remote.host.clone()))?;

    let projects = source.followed_projects().await?;
    let candidates: Vec<&FollowedProject> = projects
        .iter()
        .filter(|p| p.name == remote.repo && p.vcs_type.eq_ignore_ascii_case(vcs_type))
        .collect();
    debug!(
        "{} followed project(s) named {} on {vcs_type}",
        candidates.len(),
        remote.repo
    );

    // Same repo name under several orgs: prefer the one whose slug carries the remote's org.
    let expected = ProjectSlug::new(prefix, &remote.owner, &remote.repo);
    let chosen = candidates
        .iter()
        .find(|p| p.slug.as_str().eq_ignore_ascii_case(expected.as_str()))
        .or_else(|| candidates.first());

    Ok(chosen.map(|p| p.slug.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CciError;
    use std::cell::Cell;

    struct StaticProjects {
        projects: Vec<FollowedProject>,
        calls: Cell<usize>,
    }

    impl StaticProjects {
        fn new(projects: Vec<FollowedProject>) -> Self {
            Self {
                projects,
                calls: Cell::new(0),
            }
        }
    }

    impl FollowedProjectsSource for StaticProjects {
        fn followed_projects(&self) -> impl Future<Output = Result<Vec<FollowedProject>>> {
            self.calls.set(self.calls.get() + 1);
            futures::future::ready(Ok(self.projects.clone()))
        }
    }

    fn followed(slug: &str, name: &str, vcs_type: &str) -> FollowedProject {
        FollowedProject {
            name: name.to_string(),
            slug: slug.parse().unwrap(),
            vcs_type: vcs_type.to_string(),
            id: None,
            organization_name: None,
            default_branch: None,
        }
    }

    #[tokio::test]
    async fn matches_name_and_vcs_type() {
        let source = StaticProjects::new(vec![
            followed("bb/org/repo", "repo", "bitbucket"),
            followed("gh/org/repo", "repo", "github"),
        ]);

        let slug = identify_project_slug(&source, "git@github.com:org/repo.git")
            .await
            .unwrap();

        assert_eq!(slug.map(|s| s.to_string()), Some("gh/org/repo".to_string()));
    }

    #[tokio::test]
    async fn prefers_matching_org_among_same_named_repos() {
        let source = StaticProjects::new(vec![
            followed("gh/fork/repo", "repo", "github"),
            followed("gh/upstream/repo", "repo", "github"),
        ]);

        let slug = identify_project_slug(&source, "https://github.com/upstream/repo")
            .await
            .unwrap();

        assert_eq!(slug.map(|s| s.to_string()), Some("gh/upstream/repo".to_string()));
    }

    #[tokio::test]
    async fn no_match_is_none_not_an_error() {
        let source = StaticProjects::new(vec![followed("gh/org/other", "other", "github")]);

        let slug = identify_project_slug(&source, "https://github.com/org/repo.git")
            .await
            .unwrap();

        assert!(slug.is_none());
    }

    #[tokio::test]
    async fn unknown_host_fails_before_lookup() {
        let source = StaticProjects::new(Vec::new());

        let err = identify_project_slug(&source, "https://gitlab.com/org/repo.git")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CciError::UrlParse(UrlParseError::UnsupportedVcs(ref host)) if host == "gitlab.com"
        ));
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn host_table() {
        assert_eq!(vcs_for_host("GitHub.com"), Some(("gh", "github")));
        assert_eq!(vcs_for_host("bitbucket.org"), Some(("bb", "bitbucket")));
        assert_eq!(vcs_for_host("example.com"), None);
    }
}
