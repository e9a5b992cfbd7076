use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::info;
use serde::Serialize;

use super::dates::{cap_end_date, resolve_output_dir, to_iso8601, DateBoundary};
use crate::client::types::UsageExportState;
use crate::client::UsageApi;
use crate::error::{CciError, Result};

/// One step of a usage export. The caller keeps `job_id` between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UsageExportOutcome {
    Started { job_id: String },
    StillProcessing { job_id: String, state: String },
    Downloaded { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct UsageExportRequest {
    pub org_id: String,
    /// `YYYY-MM-DD` or a full ISO-8601 timestamp.
    pub start_date: String,
    pub end_date: String,
    /// Set to poll an export started earlier; `None` starts a new one.
    pub job_id: Option<String>,
    pub output_dir: String,
}

/// Starts an export, or checks on one exactly once and downloads it when ready.
///
/// Never loops: polling cadence belongs to the caller.
///
/// # Errors
///
/// [`CciError::UnknownJobState`] with the raw state for `failed` or any
/// unrecognised state, [`CciError::MissingDownloadUrl`] for a completed job
/// without URLs, [`CciError::Decompress`] for a corrupt archive, plus
/// transport and filesystem errors.
pub async fn get_usage_api_data(
    api: &UsageApi,
    request: &UsageExportRequest,
) -> Result<UsageExportOutcome> {
    let output_dir = resolve_output_dir(&request.output_dir)?;
    let start = to_iso8601(&request.start_date, DateBoundary::Start);
    let end = to_iso8601(&request.end_date, DateBoundary::End);

    let Some(job_id) = request.job_id.as_deref() else {
        let started = api
            .start_usage_export_job(&request.org_id, &start, &cap_end_date(&end))
            .await?;
        info!("Started usage export job {}", started.usage_export_job_id);
        return Ok(UsageExportOutcome::Started {
            job_id: started.usage_export_job_id,
        });
    };

    let status = api
        .get_usage_export_job_status(&request.org_id, job_id)
        .await?;
    info!("Usage export job {job_id} is {}", status.state);

    match status.parsed_state() {
        UsageExportState::Created | UsageExportState::Pending | UsageExportState::Processing => {
            Ok(UsageExportOutcome::StillProcessing {
                job_id: job_id.to_string(),
                state: status.state.to_lowercase(),
            })
        }
        UsageExportState::Completed => {
            let url = status
                .download_urls
                .as_ref()
                .and_then(|urls| urls.first())
                .ok_or_else(|| CciError::MissingDownloadUrl(job_id.to_string()))?;
            let archive = api.download(url).await?;
            let csv = gunzip(&archive)?;
            let path = write_export(&output_dir, &export_file_name(&start, &end), &csv).await?;
            info!("Saved usage data to {}", path.display());
            Ok(UsageExportOutcome::Downloaded { path })
        }
        UsageExportState::Other(raw) => Err(CciError::UnknownJobState(raw)),
    }
}

/// `usage-data-{start}_{end}.csv`, dates only.
pub fn export_file_name(start: &str, end: &str) -> String {
    let day = |s: &str| s.get(..10).unwrap_or(s).to_string();
    format!("usage-data-{}_{}.csv", day(start), day(end))
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(CciError::Decompress)?;
    Ok(decoded)
}

async fn write_export(dir: &Path, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::transport;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use mockito::Matcher;
    use std::io::Write;

    const CSV: &str = "project_name,job_name\nweb,lint\n";

    fn gzipped(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn request(job_id: Option<&str>, output_dir: &Path) -> UsageExportRequest {
        UsageExportRequest {
            org_id: "org-1".to_string(),
            start_date: "2025-01-01".to_string(),
            end_date: "2025-01-31".to_string(),
            job_id: job_id.map(ToString::to_string),
            output_dir: output_dir.display().to_string(),
        }
    }

    async fn status_server(body: &str) -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/organizations/org-1/usage_export_job/job-1")
            .with_body(body)
            .create_async()
            .await;
        server
    }

    #[tokio::test]
    async fn starts_job_with_expanded_dates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/organizations/org-1/usage_export_job")
            .match_body(Matcher::Json(serde_json::json!({
                "start": "2025-01-01T00:00:00Z",
                "end": "2025-01-31T23:59:59Z"
            })))
            .with_status(201)
            .with_body(r#"{"usage_export_job_id":"job-1","state":"created"}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();

        let outcome = get_usage_api_data(&UsageApi::new(transport(&server, "v2")), &request(None, dir.path()))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            UsageExportOutcome::Started {
                job_id: "job-1".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn processing_writes_nothing() {
        let server = status_server(r#"{"state":"Processing"}"#).await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("usage");

        let outcome = get_usage_api_data(
            &UsageApi::new(transport(&server, "v2")),
            &request(Some("job-1"), &output),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            UsageExportOutcome::StillProcessing {
                job_id: "job-1".to_string(),
                state: "processing".to_string()
            }
        );
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn completed_job_is_downloaded_and_decompressed() {
        let mut server = mockito::Server::new_async().await;
        let download_url = format!("{}/exports/usage.csv.gz", server.url());
        server
            .mock("GET", "/api/v2/organizations/org-1/usage_export_job/job-1")
            .with_body(
                serde_json::json!({"state": "completed", "download_urls": [download_url]}).to_string(),
            )
            .create_async()
            .await;
        let download = server
            .mock("GET", "/exports/usage.csv.gz")
            .match_header("circle-token", Matcher::Missing)
            .with_body(gzipped(CSV))
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("usage");

        let outcome = get_usage_api_data(
            &UsageApi::new(transport(&server, "v2")),
            &request(Some("job-1"), &output),
        )
        .await
        .unwrap();

        let expected = output.join("usage-data-2025-01-01_2025-01-31.csv");
        assert_eq!(outcome, UsageExportOutcome::Downloaded { path: expected.clone() });
        assert_eq!(std::fs::read_to_string(expected).unwrap(), CSV);
        download.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_state_is_fatal_and_verbatim() {
        let server = status_server(r#"{"state":"exploded"}"#).await;
        let dir = tempfile::tempdir().unwrap();

        let err = get_usage_api_data(
            &UsageApi::new(transport(&server, "v2")),
            &request(Some("job-1"), dir.path()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CciError::UnknownJobState(ref s) if s == "exploded"));
        assert!(err.to_string().contains("exploded"));
    }

    #[tokio::test]
    async fn unknown_state_keeps_original_case() {
        let server = status_server(r#"{"state":"Exploded_Badly"}"#).await;
        let dir = tempfile::tempdir().unwrap();

        let err = get_usage_api_data(
            &UsageApi::new(transport(&server, "v2")),
            &request(Some("job-1"), dir.path()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CciError::UnknownJobState(ref s) if s == "Exploded_Badly"));
        assert!(err.to_string().contains("Exploded_Badly"));
    }

    #[tokio::test]
    async fn failed_state_is_fatal() {
        let server = status_server(r#"{"state":"failed"}"#).await;
        let dir = tempfile::tempdir().unwrap();

        let err = get_usage_api_data(
            &UsageApi::new(transport(&server, "v2")),
            &request(Some("job-1"), dir.path()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CciError::UnknownJobState(ref s) if s == "failed"));
    }

    #[tokio::test]
    async fn completed_without_urls_is_an_error() {
        let server = status_server(r#"{"state":"completed","download_urls":[]}"#).await;
        let dir = tempfile::tempdir().unwrap();

        let err = get_usage_api_data(
            &UsageApi::new(transport(&server, "v2")),
            &request(Some("job-1"), dir.path()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CciError::MissingDownloadUrl(_)));
    }

    #[test]
    fn corrupt_archive_is_a_decompress_error() {
        assert!(matches!(gunzip(b"not gzip"), Err(CciError::Decompress(_))));
    }

    #[test]
    fn file_name_uses_dates_only() {
        assert_eq!(
            export_file_name("2025-01-01T00:00:00Z", "2025-01-31T23:59:59Z"),
            "usage-data-2025-01-01_2025-01-31.csv"
        );
    }
}
