use std::path::PathBuf;

use chrono::{DateTime, Days, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::{CciError, Result};

/// Guard against minor clock drift between us and the usage service.
const CLOCK_BUFFER_SECS: i64 = 60;

const ISO_SECONDS: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBoundary {
    Start,
    End,
}

/// Expands a bare `YYYY-MM-DD` to the first or last second of that day.
/// Anything already carrying a time (`T`) is returned unchanged.
pub fn to_iso8601(date: &str, boundary: DateBoundary) -> String {
    let date = date.trim();
    if date.contains('T') {
        return date.to_string();
    }
    match boundary {
        DateBoundary::Start => format!("{date}T00:00:00Z"),
        DateBoundary::End => format!("{date}T23:59:59Z"),
    }
}

const DAY_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%a, %B %d, %Y",
    "%A %B %d %Y",
];

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// A date typed by a person: either a whole day or an exact moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDate {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl UserDate {
    /// ISO-8601 in UTC. Whole days become their first or last second.
    pub fn to_iso8601(self, boundary: DateBoundary) -> String {
        match (self, boundary) {
            (Self::Instant(at), _) => at.format(ISO_SECONDS).to_string(),
            (Self::Day(day), DateBoundary::Start) => format!("{day}T00:00:00Z"),
            (Self::Day(day), DateBoundary::End) => format!("{day}T23:59:59Z"),
        }
    }
}

/// Reads a human-written date relative to `now`.
///
/// Understands ISO dates and timestamps, `2025/03/01`, `03/01/2025`,
/// `March 1, 2025`, `1 Mar 2025`, `now`, `today`, `yesterday`, `tomorrow`,
/// `last week|month|year` and `N days|weeks|months|years ago`.
pub fn parse_user_date_at(input: &str, now: DateTime<Utc>) -> Option<UserDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(UserDate::Instant(parsed.with_timezone(&Utc)));
    }
    if let Some(naive) = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
    {
        return Some(UserDate::Instant(naive.and_utc()));
    }
    if let Some(day) = DAY_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
    {
        return Some(UserDate::Day(day));
    }

    relative_date(&input.to_lowercase(), now)
}

fn relative_date(input: &str, now: DateTime<Utc>) -> Option<UserDate> {
    let today = now.date_naive();
    match input {
        "now" => return Some(UserDate::Instant(now)),
        "today" => return Some(UserDate::Day(today)),
        "yesterday" => return today.checked_sub_days(Days::new(1)).map(UserDate::Day),
        "tomorrow" => return today.checked_add_days(Days::new(1)).map(UserDate::Day),
        _ => {}
    }

    let (amount, unit) = match input.strip_prefix("last ") {
        Some(unit) => (1, unit.trim()),
        None => {
            let re = Regex::new(r"^(\d+)\s+(day|week|month|year)s?\s+ago$").ok()?;
            let captures = re.captures(input)?;
            let amount: u32 = captures.get(1)?.as_str().parse().ok()?;
            return units_ago(today, amount, captures.get(2)?.as_str()).map(UserDate::Day);
        }
    };
    units_ago(today, amount, unit).map(UserDate::Day)
}

fn units_ago(today: NaiveDate, amount: u32, unit: &str) -> Option<NaiveDate> {
    match unit {
        "day" => today.checked_sub_days(Days::new(u64::from(amount))),
        "week" => today.checked_sub_days(Days::new(u64::from(amount) * 7)),
        "month" => today.checked_sub_months(Months::new(amount)),
        "year" => today.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

/// Turns a human-written date into the ISO-8601 form the usage API expects.
///
/// # Errors
///
/// [`CciError::InvalidDate`] carrying the input when it cannot be read.
pub fn normalize_user_date(input: &str, boundary: DateBoundary) -> Result<String> {
    normalize_user_date_at(input, boundary, Utc::now())
}

/// [`normalize_user_date`] with an explicit clock.
pub fn normalize_user_date_at(
    input: &str,
    boundary: DateBoundary,
    now: DateTime<Utc>,
) -> Result<String> {
    parse_user_date_at(input, now)
        .map(|date| date.to_iso8601(boundary))
        .ok_or_else(|| CciError::InvalidDate(input.to_string()))
}

/// Clamps a future end timestamp to one minute before now.
pub fn cap_end_date(iso_date: &str) -> String {
    cap_end_date_at(iso_date, Utc::now())
}

/// [`cap_end_date`] with an explicit clock. Unparseable input passes through.
pub fn cap_end_date_at(iso_date: &str, now: DateTime<Utc>) -> String {
    let effective_now = now - Duration::seconds(CLOCK_BUFFER_SECS);
    match parse_timestamp(iso_date) {
        Some(input) if input > effective_now => effective_now.format(ISO_SECONDS).to_string(),
        _ => iso_date.to_string(),
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Expands a leading `~` and `%USERPROFILE%` before the path touches the filesystem.
///
/// # Errors
///
/// Returns [`CciError::Config`] when the directory is empty or the home
/// directory is needed but unknown.
pub fn resolve_output_dir(output_dir: &str) -> Result<PathBuf> {
    let output_dir = output_dir.trim();
    if output_dir.is_empty() {
        return Err(CciError::Config(
            "An output directory is required to save usage data".to_string(),
        ));
    }

    let home = || {
        dirs::home_dir()
            .ok_or_else(|| CciError::Config("Could not determine home directory".to_string()))
    };

    if let Some(rest) = output_dir.strip_prefix('~') {
        let rest = rest.trim_start_matches(['/', '\\']);
        return Ok(home()?.join(rest));
    }

    if output_dir.contains("%USERPROFILE%") {
        let profile = match std::env::var("USERPROFILE") {
            Ok(profile) if !profile.is_empty() => profile,
            _ => home()?.to_string_lossy().into_owned(),
        };
        return Ok(PathBuf::from(output_dir.replacen("%USERPROFILE%", &profile, 1)));
    }

    Ok(PathBuf::from(output_dir))
}
