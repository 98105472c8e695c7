use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

/// One program-guide entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleRow {
    pub timestamp_utc: DateTime<Utc>,
    pub label: String,
    pub searchable_text: String,
}

impl ScheduleRow {
    /// `<ISO-8601 timestamp>: <label>`, the output file line.
    pub fn line(&self) -> String {
        format!("{}: {}", self.timestamp_utc.to_rfc3339_opts(SecondsFormat::Millis, true), self.label)
    }
}

// Plan envelope types
#[derive(Serialize)]
pub struct RequestSample { pub date: NaiveDate, pub url: String }

#[derive(Serialize)]
pub struct ScrapePlan {
    pub channel: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub dates: usize,
    pub search: Option<String>,
    pub out: String,
    pub cookie: bool,
    pub sample_requests: Vec<RequestSample>,
}

// Apply/result envelope types
#[derive(Serialize)]
pub struct ScrapeResult {
    pub status: super::batch::BatchStatus,
    pub rounds: usize,
    /// Date fetches re-issued by rate-limit rounds.
    pub retried: usize,
    pub requested: usize,
    pub processed: usize,
    pub dropped: Vec<NaiveDate>,
    pub rows: usize,
    pub out: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn line_is_iso_prefixed() {
        let row = ScheduleRow {
            timestamp_utc: Utc.with_ymd_and_hms(2024, 1, 10, 5, 30, 0).unwrap(),
            label: "News".into(),
            searchable_text: "News".into(),
        };
        assert_eq!(row.line(), "2024-01-10T05:30:00.000Z: News");
    }
}
