use super::http::HttpClient;
use super::pagination::{paginate, PaginationOptions};
use super::params::QueryParams;
use super::types::{RerunWorkflowRequest, RerunWorkflowResponse, Workflow};
use crate::error::Result;

#[derive(Clone)]
pub struct WorkflowsApi {
    http: HttpClient,
    pagination: PaginationOptions,
}

impl WorkflowsApi {
    pub fn new(http: HttpClient, pagination: PaginationOptions) -> Self {
        Self { http, pagination }
    }

    pub async fn get_pipeline_workflows(
        &self,
        pipeline_id: &str,
        options: Option<&PaginationOptions>,
    ) -> Result<Vec<Workflow>> {
        let path = format!("/pipeline/{}/workflow", urlencoding::encode(pipeline_id));
        let params = QueryParams::new();
        let (path, params) = (path.as_str(), &params);

        paginate(options.unwrap_or(&self.pagination), move |token| {
            self.http.get_page(path, params, token, "workflows")
        })
        .await
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        let path = format!("/workflow/{}", urlencoding::encode(workflow_id));
        self.http
            .get_json(&path, &QueryParams::new(), "workflow")
            .await
    }

    /// Reruns a workflow, optionally only its failed jobs or with SSH enabled.
    pub async fn rerun_workflow(
        &self,
        workflow_id: &str,
        request: &RerunWorkflowRequest,
    ) -> Result<RerunWorkflowResponse> {
        let path = format!("/workflow/{}/rerun", urlencoding::encode(workflow_id));
        self.http
            .post(&path, Some(request), &QueryParams::new())
            .await?
            .decode("workflow rerun")
    }
}
