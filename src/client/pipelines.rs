use log::debug;
use serde_json::{json, Map, Value};

use super::http::HttpClient;
use super::pagination::{paginate, paginate_filtered, FilterMode, PaginationOptions};
use super::params::QueryParams;
use super::types::{Pipeline, PipelineCreated, ProjectSlug};
use crate::error::Result;

#[derive(Clone)]
pub struct PipelinesApi {
    http: HttpClient,
    pagination: PaginationOptions,
}

impl PipelinesApi {
    pub fn new(http: HttpClient, pagination: PaginationOptions) -> Self {
        Self { http, pagination }
    }

    /// First page only, newest first.
    pub async fn get_recent_pipelines(
        &self,
        slug: &ProjectSlug,
        branch: Option<&str>,
    ) -> Result<Vec<Pipeline>> {
        let params = QueryParams::new().push_opt("branch", branch);
        let page = self
            .http
            .get_page(&pipelines_path(slug), &params, None, "pipelines")
            .await?;
        Ok(page.items)
    }

    /// All pipelines of a project, optionally restricted to `branch`.
    ///
    /// # Errors
    ///
    /// Fails with a pagination limit error rather than returning a partial list.
    pub async fn get_pipelines_by_branch(
        &self,
        slug: &ProjectSlug,
        branch: Option<&str>,
        options: Option<&PaginationOptions>,
    ) -> Result<Vec<Pipeline>> {
        let path = pipelines_path(slug);
        let params = QueryParams::new().push_opt("branch", branch);
        let (path, params) = (path.as_str(), &params);

        paginate(self.options(options), move |token| {
            self.http.get_page(path, params, token, "pipelines")
        })
        .await
    }

    pub async fn get_pipeline_by_number(&self, slug: &ProjectSlug, number: u64) -> Result<Pipeline> {
        let path = format!("{}/{number}", pipelines_path(slug));
        self.http
            .get_json(&path, &QueryParams::new(), "pipeline")
            .await
    }

    /// Pipelines on `branch` accepted by `predicate`, scanned with the
    /// early-stop rules of `mode`.
    pub async fn get_filtered_pipelines<P>(
        &self,
        slug: &ProjectSlug,
        branch: Option<&str>,
        options: Option<&PaginationOptions>,
        mode: FilterMode,
        predicate: P,
    ) -> Result<Vec<Pipeline>>
    where
        P: FnMut(&Pipeline) -> bool,
    {
        let path = pipelines_path(slug);
        let params = QueryParams::new().push_opt("branch", branch);
        let (path, params) = (path.as_str(), &params);

        paginate_filtered(
            self.options(options),
            mode,
            move |token| self.http.get_page(path, params, token, "pipelines"),
            predicate,
        )
        .await
    }

    /// The first pipeline built from `commit`, or `None` if the scanned
    /// window holds none.
    ///
    /// The commit may surface as the GitHub App `commit_sha`, the generic git
    /// `checkout_sha`, or `vcs.revision`; all three are checked.
    pub async fn get_pipeline_by_commit(
        &self,
        slug: &ProjectSlug,
        branch: Option<&str>,
        commit: &str,
        options: Option<&PaginationOptions>,
    ) -> Result<Option<Pipeline>> {
        let matches = self
            .get_filtered_pipelines(slug, branch, options, FilterMode::FindFirst, |pipeline| {
                pipeline.matches_commit(commit)
            })
            .await?;
        debug!("Commit {commit} matched {} pipeline(s)", matches.len());
        Ok(matches.into_iter().next())
    }

    pub async fn trigger_pipeline(
        &self,
        slug: &ProjectSlug,
        branch: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<PipelineCreated> {
        let mut body = json!({ "branch": branch });
        if let Some(parameters) = parameters {
            body["parameters"] = Value::Object(parameters);
        }
        self.http
            .post(&pipelines_path(slug), Some(&body), &QueryParams::new())
            .await?
            .decode("pipeline trigger")
    }

    fn options<'a>(&'a self, options: Option<&'a PaginationOptions>) -> &'a PaginationOptions {
        options.unwrap_or(&self.pagination)
    }
}

fn pipelines_path(slug: &ProjectSlug) -> String {
    format!("/project/{}/pipeline", slug.escaped())
}
