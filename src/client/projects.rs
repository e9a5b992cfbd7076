use super::http::HttpClient;
use super::params::QueryParams;
use super::types::{Project, ProjectSlug};
use crate::error::Result;

#[derive(Clone)]
pub struct ProjectsApi {
    http: HttpClient,
}

impl ProjectsApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn get_project(&self, slug: &ProjectSlug) -> Result<Project> {
        let path = format!("/project/{}", slug.escaped());
        self.http.get_json(&path, &QueryParams::new(), "project").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::transport;
    use crate::error::CciError;
    use serde_json::json;

    #[tokio::test]
    async fn reads_project_identity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/project/gh/org/repo")
            .with_body(
                json!({
                    "slug": "gh/org/repo",
                    "name": "repo",
                    "id": "5f0b",
                    "organization_name": "org",
                    "organization_id": "c9a1",
                    "vcs_info": {"vcs_url": "https://github.com/org/repo", "provider": "GitHub", "default_branch": "main"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let api = ProjectsApi::new(transport(&server, "v2"));
        let project = api.get_project(&"gh/org/repo".parse().unwrap()).await.unwrap();

        assert_eq!(project.id, "5f0b");
        assert_eq!(project.organization_id.as_deref(), Some("c9a1"));
    }

    #[tokio::test]
    async fn missing_project_is_an_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/project/gh/org/gone")
            .with_status(404)
            .with_body(r#"{"message":"Project not found"}"#)
            .create_async()
            .await;

        let api = ProjectsApi::new(transport(&server, "v2"));
        let err = api
            .get_project(&"gh/org/gone".parse().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, CciError::Api { status: 404, .. }));
    }
}
