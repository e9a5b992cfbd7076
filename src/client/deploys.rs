use super::http::HttpClient;
use super::pagination::{paginate, PaginationOptions};
use super::params::QueryParams;
use super::types::{
    Component, ComponentVersion, DeploySettings, Environment, RollbackRequest, RollbackResponse,
};
use crate::error::Result;

/// Deploy markers: environments, components, their versions and rollbacks.
#[derive(Clone)]
pub struct DeploysApi {
    http: HttpClient,
    pagination: PaginationOptions,
}

impl DeploysApi {
    pub fn new(http: HttpClient, pagination: PaginationOptions) -> Self {
        Self { http, pagination }
    }

    pub async fn fetch_environments(&self, org_id: &str) -> Result<Vec<Environment>> {
        let params = QueryParams::new().push("org-id", org_id);
        self.collect("/deploy/environments", params, "environments")
            .await
    }

    pub async fn fetch_project_components(
        &self,
        org_id: &str,
        project_id: &str,
    ) -> Result<Vec<Component>> {
        let params = QueryParams::new()
            .push("org-id", org_id)
            .push("project-id", project_id);
        self.collect("/deploy/components", params, "components").await
    }

    pub async fn fetch_component_versions(
        &self,
        component_id: &str,
        environment_id: &str,
    ) -> Result<Vec<ComponentVersion>> {
        let path = format!(
            "/deploy/components/{}/versions",
            urlencoding::encode(component_id)
        );
        let params = QueryParams::new().push("environment-id", environment_id);
        self.collect(&path, params, "component versions").await
    }

    pub async fn fetch_project_deploy_settings(&self, project_id: &str) -> Result<DeploySettings> {
        let path = format!("/projects/{}/deploy-settings", urlencoding::encode(project_id));
        self.http
            .get_json(&path, &QueryParams::new(), "deploy settings")
            .await
    }

    pub async fn run_rollback_pipeline(
        &self,
        project_id: &str,
        request: &RollbackRequest,
    ) -> Result<RollbackResponse> {
        let path = format!("/projects/{}/rollback", urlencoding::encode(project_id));
        self.http
            .post(&path, Some(request), &QueryParams::new())
            .await?
            .decode("rollback")
    }

    async fn collect<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: QueryParams,
        context: &str,
    ) -> Result<Vec<T>> {
        let params = &params;
        paginate(&self.pagination, move |token| {
            self.http.get_page(path, params, token, context)
        })
        .await
    }
}
