use std::path::Path;

use anyhow::{Context, Result};

use super::types::ScheduleRow;

/// Output lines, sorted. ISO-8601 prefixes make this chronological.
pub fn render_lines(rows: &[ScheduleRow]) -> Vec<String> {
    let mut lines: Vec<String> = rows.iter().map(ScheduleRow::line).collect();
    lines.sort();
    lines
}

/// Overwrite `path` with one line per row. An empty result still creates the file.
pub fn write_schedule(path: &Path, rows: &[ScheduleRow]) -> Result<usize> {
    let lines = render_lines(rows);
    let mut body = lines.join("\n");
    if !body.is_empty() { body.push('\n'); }
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(h: u32, label: &str) -> ScheduleRow {
        ScheduleRow {
            timestamp_utc: Utc.with_ymd_and_hms(2024, 1, 10, h, 0, 0).unwrap(),
            label: label.into(),
            searchable_text: label.into(),
        }
    }

    fn temp_file() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tvp-out-{}.txt", uuid::Uuid::new_v4()))
    }

    #[test]
    fn lines_are_sorted() {
        let lines = render_lines(&[row(21, "Movie"), row(9, "News"), row(12, "Sport")]);
        assert_eq!(lines, vec![
            "2024-01-10T09:00:00.000Z: News",
            "2024-01-10T12:00:00.000Z: Sport",
            "2024-01-10T21:00:00.000Z: Movie",
        ]);
    }

    #[test]
    fn write_overwrites_previous_file() {
        let path = temp_file();
        std::fs::write(&path, "stale\nstale\nstale\n").unwrap();
        let n = write_schedule(&path, &[row(9, "News")]).unwrap();
        let got = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(n, 1);
        assert_eq!(got, "2024-01-10T09:00:00.000Z: News\n");
    }

    #[test]
    fn empty_result_still_creates_file() {
        let path = temp_file();
        write_schedule(&path, &[]).unwrap();
        let got = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(got, "");
    }
}
