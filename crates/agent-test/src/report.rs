//! Report formats for a finished run.

use agent_test_core::TestSummary;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

/// Format for report output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Console,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown format: {s}. Valid formats: console, json")),
        }
    }
}

/// JSON report: the run summary stamped with the time it was written.
#[derive(Debug, Serialize)]
pub struct ExecutionReport<'a> {
    pub timestamp: String,
    pub summary: &'a TestSummary,
}

impl<'a> ExecutionReport<'a> {
    #[must_use]
    pub fn new(summary: &'a TestSummary) -> Self {
        Self {
            timestamp: report_timestamp(OffsetDateTime::now_utc()),
            summary,
        }
    }
}

fn report_timestamp(now: OffsetDateTime) -> String {
    now.format(&format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
    .unwrap_or_else(|_| "unknown".to_string())
}

/// Serialize a report as pretty JSON.
#[must_use]
pub fn format_report_json(report: &ExecutionReport<'_>) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_report_format_from_str() -> Result<(), String> {
        assert_eq!("console".parse::<ReportFormat>()?, ReportFormat::Console);
        assert_eq!("JSON".parse::<ReportFormat>()?, ReportFormat::Json);
        Ok(())
    }

    #[test]
    fn test_report_format_unknown() {
        let result = "table".parse::<ReportFormat>();
        assert!(result.is_err_and(|e| e.contains("console, json")));
    }

    #[test]
    fn test_report_timestamp() {
        let ts = report_timestamp(datetime!(2026-03-04 05:06:07.089 UTC));
        assert_eq!(ts, "2026-03-04T05:06:07.089Z");
    }
}
