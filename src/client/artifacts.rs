use super::http::HttpClient;
use super::pagination::{paginate, PaginationOptions};
use super::params::QueryParams;
use super::types::{Artifact, ProjectSlug};
use crate::error::Result;

#[derive(Clone)]
pub struct ArtifactsApi {
    http: HttpClient,
    pagination: PaginationOptions,
}

impl ArtifactsApi {
    pub fn new(http: HttpClient, pagination: PaginationOptions) -> Self {
        Self { http, pagination }
    }

    pub async fn get_all_job_artifacts(
        &self,
        slug: &ProjectSlug,
        job_number: u64,
        options: Option<&PaginationOptions>,
    ) -> Result<Vec<Artifact>> {
        let path = format!("/project/{}/{job_number}/artifacts", slug.escaped());
        let params = QueryParams::new();
        let (path, params) = (path.as_str(), &params);

        paginate(options.unwrap_or(&self.pagination), move |token| {
            self.http.get_page(path, params, token, "artifacts")
        })
        .await
    }
}

/// Keeps artifacts whose path starts with `prefix`; `None` keeps everything.
pub fn filter_artifacts(artifacts: Vec<Artifact>, prefix: Option<&str>) -> Vec<Artifact> {
    match prefix {
        Some(prefix) => artifacts
            .into_iter()
            .filter(|a| a.path.starts_with(prefix))
            .collect(),
        None => artifacts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::transport;
    use mockito::Matcher;
    use serde_json::json;

    fn artifact(path: &str) -> serde_json::Value {
        json!({"path": path, "node_index": 0, "url": format!("https://output.circle-artifacts.com/{path}")})
    }

    #[tokio::test]
    async fn collects_all_pages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/project/gh/org/repo/9/artifacts")
            .match_query(Matcher::Exact(String::new()))
            .with_body(json!({"items": [artifact("coverage/index.html")], "next_page_token": "p2"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/api/v2/project/gh/org/repo/9/artifacts")
            .match_query(Matcher::Exact("page-token=p2".to_string()))
            .with_body(json!({"items": [artifact("logs/app.log")]}).to_string())
            .create_async()
            .await;

        let api = ArtifactsApi::new(transport(&server, "v2"), PaginationOptions::default());
        let slug = "gh/org/repo".parse().unwrap();
        let artifacts = api.get_all_job_artifacts(&slug, 9, None).await.unwrap();

        assert_eq!(artifacts.len(), 2);
        let coverage = filter_artifacts(artifacts, Some("coverage/"));
        assert_eq!(coverage.len(), 1);
        assert_eq!(coverage[0].path, "coverage/index.html");
    }
}
