//! Usage data: export orchestration and underused resource class analysis.

mod dates;
mod export;
mod underused;

pub use dates::{
    cap_end_date, cap_end_date_at, normalize_user_date, normalize_user_date_at, parse_user_date_at,
    resolve_output_dir, to_iso8601, DateBoundary, UserDate,
};
pub use export::{export_file_name, get_usage_api_data, UsageExportOutcome, UsageExportRequest};
pub use underused::{
    analyze_usage_csv, find_underused_resource_classes, render_report, UnderusedJob,
    UnderusedReport, DEFAULT_THRESHOLD,
};
