use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

/// Upper bound on one run; keeps a typo'd year from queueing decades of requests.
pub const MAX_RANGE_DAYS: i64 = 366;

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD)"))
}

/// Inclusive list of dates from `from` to `to` (defaults to `from`).
pub fn date_range(from: &str, to: Option<&str>) -> Result<Vec<NaiveDate>> {
    let start = parse_date(from)?;
    let end = match to {
        Some(t) => parse_date(t)?,
        None => start,
    };
    if end < start {
        bail!("end date {end} is before start date {start}");
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        bail!("range of {days} days exceeds the {MAX_RANGE_DAYS}-day limit");
    }
    Ok(start.iter_days().take(days as usize).collect())
}
