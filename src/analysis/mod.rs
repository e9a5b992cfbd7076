//! Multi-request workflows composed from the resource clients.

mod failure_logs;
mod ssh;
mod workflow_performance;

pub use failure_logs::{
    get_job_logs, truncate_head, FailureLogsOptions, FailureLogsRequest, JobFailureLogs, StepLog,
    DEFAULT_MAX_OUTPUT_CHARS,
};
pub use flaky_tests::get_flaky_tests;
pub use ssh::{extract_ssh_command, get_ssh_details, SshDetails};
pub use workflow_performance::{
    analyze_workflow_performance, summarize, JobDuration, WorkflowPerformance, SLOWEST_JOBS,
};
