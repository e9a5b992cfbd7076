use serde_json::json;

use super::http::HttpClient;
use super::params::QueryParams;
use super::types::{UsageExportJobStart, UsageExportJobStatus};
use crate::error::Result;

#[derive(Clone)]
pub struct UsageApi {
    http: HttpClient,
}

impl UsageApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Asks the server to materialize usage data for `[start, end]`.
    ///
    /// # Arguments
    ///
    /// * `org_id` - organization UUID
    /// * `start`, `end` - ISO-8601 timestamps
    pub async fn start_usage_export_job(
        &self,
        org_id: &str,
        start: &str,
        end: &str,
    ) -> Result<UsageExportJobStart> {
        let path = format!("/organizations/{}/usage_export_job", urlencoding::encode(org_id));
        self.http
            .post(&path, Some(&json!({ "start": start, "end": end })), &QueryParams::new())
            .await?
            .decode("usage export job start")
    }

    pub async fn get_usage_export_job_status(
        &self,
        org_id: &str,
        job_id: &str,
    ) -> Result<UsageExportJobStatus> {
        let path = format!(
            "/organizations/{}/usage_export_job/{}",
            urlencoding::encode(org_id),
            urlencoding::encode(job_id)
        );
        self.http
            .get_json(&path, &QueryParams::new(), "usage export job status")
            .await
    }

    /// Fetches a pre-signed export artifact.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.http.download(url).await
    }
}
