use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CciError {
    #[error("CircleCI API error: {status}\nURL: {url}\nMessage: {message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse {context} response: {source}")]
    SchemaValidation {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Pagination(#[from] PaginationLimitError),

    #[error(transparent)]
    UrlParse(#[from] UrlParseError),

    #[error(transparent)]
    UsageReport(#[from] UsageReportError),

    #[error("Unknown job state: {0}")]
    UnknownJobState(String),

    #[error("Could not understand date: {0}")]
    InvalidDate(String),

    #[error("No download URL found in usage export job {0}")]
    MissingDownloadUrl(String),

    #[error("Failed to decompress usage data: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Safety-valve failures of the pagination engine. Never a silent truncation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaginationLimitError {
    #[error("Maximum number of pages ({max_pages}) exceeded")]
    MaxPagesExceeded { max_pages: usize },

    #[error("Pagination timed out after {timeout:?}")]
    TimeoutExceeded { timeout: Duration },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlParseError {
    #[error("Invalid CircleCI URL format: {0}")]
    InvalidFormat(String),

    #[error("Unable to extract project information from URL: {0}")]
    IncompleteProjectInfo(String),

    #[error("Unable to extract pipeline number from URL: {0}")]
    MissingPipelineNumber(String),

    #[error("Unable to extract job number from URL: {0}")]
    MissingJobNumber(String),

    #[error("Unable to extract workflow ID from URL: {0}")]
    MissingWorkflowId(String),

    #[error("Invalid git remote URL: {0}")]
    InvalidGitRemote(String),

    #[error("Unsupported VCS host: {0}")]
    UnsupportedVcs(String),

    #[error("Invalid project slug: {0}")]
    InvalidProjectSlug(String),
}

#[derive(Error, Debug)]
pub enum UsageReportError {
    #[error("Could not read CSV file at {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    #[error(
        "CSV is missing required columns ({}). Required: project_name, workflow_name, job_name, resource_class, median_cpu_utilization_pct, max_cpu_utilization_pct, median_ram_utilization_pct, max_ram_utilization_pct",
        .missing.join(", ")
    )]
    Schema { missing: Vec<String> },
}

pub type Result<T> = std::result::Result<T, CciError>;
