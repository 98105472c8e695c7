use std::sync::LazyLock;

use chrono::DateTime;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use super::types::ScheduleRow;

/// Row attribute holding the program start as epoch seconds.
pub const TIMESTAMP_ATTR: &str = "data-timestamp";

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("static selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("static selector"));

/// Decoded JSONP payload. Error bodies carry `code`/`message`, success bodies `data.program`.
#[derive(Debug, Default, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    // PHP backends send `[]` for an empty object, so keep this loose
    #[serde(default)]
    pub data: Option<Value>,
}

impl ApiEnvelope {
    /// Non-empty `data.program`, if any.
    pub fn program(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get("program"))
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
    }
}

#[derive(Debug)]
pub enum DecodeError {
    MissingWrapper,
    Json(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::MissingWrapper => write!(f, "body is not wrapped in the expected callback"),
            DecodeError::Json(err) => write!(f, "decode error: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Json(err) => Some(err),
            DecodeError::MissingWrapper => None,
        }
    }
}

/// Strip `<callback>(` ... `)` and decode the JSON inside.
pub fn decode_envelope(body: &str, callback: &str) -> Result<ApiEnvelope, DecodeError> {
    let inner = body
        .trim()
        .strip_prefix(callback)
        .and_then(|s| s.strip_prefix('('))
        .map(|s| s.trim_end().trim_end_matches(';').trim_end())
        .and_then(|s| s.strip_suffix(')'))
        .ok_or(DecodeError::MissingWrapper)?;
    serde_json::from_str(inner).map_err(DecodeError::Json)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    MissingTimestamp { row: usize },
    InvalidTimestamp { row: usize, value: String },
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::MissingTimestamp { row } => write!(f, "row {row}: missing {TIMESTAMP_ATTR}"),
            RowError::InvalidTimestamp { row, value } => write!(f, "row {row}: bad {TIMESTAMP_ATTR} {value:?}"),
        }
    }
}

impl std::error::Error for RowError {}

/// Parsed program HTML. Rows are read lazily from it, one pass per call to `rows`.
pub struct ProgramFragment {
    doc: Html,
}

impl ProgramFragment {
    pub fn parse(html: &str) -> Self {
        // bare <tr> outside a table context is dropped by the HTML parser,
        // so every row goes into one table regardless of how the source nests them
        let doc = Html::parse_fragment(&format!("<table>{}</table>", strip_table_tags(html)));
        Self { doc }
    }

    /// Rows in document order. Header rows (no `<td>`) are not rows.
    pub fn rows(&self) -> impl Iterator<Item = Result<ScheduleRow, RowError>> + '_ {
        self.doc
            .select(&ROW)
            .filter(|tr| tr.select(&CELL).next().is_some())
            .enumerate()
            .map(|(idx, tr)| parse_row(idx, tr))
    }
}

fn parse_row(idx: usize, tr: ElementRef<'_>) -> Result<ScheduleRow, RowError> {
    let raw = tr.value().attr(TIMESTAMP_ATTR).ok_or(RowError::MissingTimestamp { row: idx })?;
    let invalid = || RowError::InvalidTimestamp { row: idx, value: raw.to_string() };
    let secs: i64 = raw.trim().parse().map_err(|_| invalid())?;
    let timestamp_utc = DateTime::from_timestamp(secs, 0).ok_or_else(invalid)?;

    let label = tr
        .select(&CELL)
        .find(|td| !td.value().classes().any(|c| c == "time"))
        .map(text_of)
        .unwrap_or_default();

    let mut searchable = vec![label.clone()];
    if let Some(a) = tr.select(&LINK).next() {
        searchable.push(text_of(a));
        if let Some(title) = a.value().attr("title") {
            searchable.push(title.trim().to_string());
        }
    }
    let searchable_text = searchable.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

    Ok(ScheduleRow { timestamp_utc, label, searchable_text })
}

/// Drop `<table>`/`<tbody>` open and close tags, keeping everything else.
fn strip_table_tags(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(off) = lower[pos..].find('<') {
        let start = pos + off;
        out.push_str(&html[pos..start]);
        let name = lower[start + 1..].trim_start_matches('/');
        let container = ["table", "tbody"].iter().any(|tag| {
            name.starts_with(tag)
                && name[tag.len()..].starts_with(|c: char| c == '>' || c == '/' || c.is_ascii_whitespace())
        });
        if !container {
            out.push('<');
            pos = start + 1;
            continue;
        }
        match lower[start..].find('>') {
            Some(end) => pos = start + end + 1,
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CB: &str = "tvprogramenb6";

    #[test]
    fn decode_success_envelope() {
        let body = r#"tvprogramenb6({"data":{"program":"<tr></tr>"}})"#;
        let env = decode_envelope(body, CB).unwrap();
        assert_eq!(env.program(), Some("<tr></tr>"));
        assert_eq!(env.code, None);
    }

    #[test]
    fn decode_tolerates_semicolon_and_whitespace() {
        let body = "  tvprogramenb6({\"code\":1226});\n";
        let env = decode_envelope(body, CB).unwrap();
        assert_eq!(env.code, Some(1226));
        assert_eq!(env.program(), None);
    }

    #[test]
    fn decode_rejects_other_callback() {
        let body = r#"tvprogramenb5({"code":1})"#;
        assert!(matches!(decode_envelope(body, CB), Err(DecodeError::MissingWrapper)));
    }

    #[test]
    fn decode_rejects_bad_json() {
        let body = "tvprogramenb6(<html>oops</html>)";
        assert!(matches!(decode_envelope(body, CB), Err(DecodeError::Json(_))));
    }

    #[test]
    fn empty_data_array_has_no_program() {
        let env = decode_envelope("tvprogramenb6({\"data\":[]})", CB).unwrap();
        assert_eq!(env.program(), None);
        let env = decode_envelope("tvprogramenb6({\"data\":{\"program\":\"  \"}})", CB).unwrap();
        assert_eq!(env.program(), None);
    }

    #[test]
    fn rows_read_label_and_link() {
        let html = r#"
        <table>
          <tr><th>Time</th><th>Show</th></tr>
          <tr data-timestamp="1704866400">
            <td class="time">07:00</td>
            <td><a href="/p/1" title="Evening bulletin">News</a>   at seven</td>
          </tr>
        </table>"#;
        let frag = ProgramFragment::parse(html);
        let rows: Vec<ScheduleRow> = frag.rows().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp_utc.timestamp(), 1704866400);
        assert_eq!(rows[0].label, "News at seven");
        assert_eq!(rows[0].searchable_text, "News at seven News Evening bulletin");
    }

    #[test]
    fn bare_rows_are_wrapped() {
        let html = r#"<tr data-timestamp="10"><td class="time">x</td><td>Film</td></tr>"#;
        let rows: Vec<ScheduleRow> = ProgramFragment::parse(html).rows().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "Film");
    }

    #[test]
    fn rows_beside_a_table_are_kept() {
        let html = r#"<tr data-timestamp="10"><td>A</td></tr>
          <TABLE class="grid"><tbody><tr data-timestamp="20"><td>B</td></tr></tbody></TABLE>
          <tr data-timestamp="30"><td>C</td></tr>"#;
        let rows: Vec<ScheduleRow> = ProgramFragment::parse(html).rows().collect::<Result<_, _>>().unwrap();
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
    }

    #[test]
    fn table_tags_are_stripped_but_lookalikes_stay() {
        assert_eq!(strip_table_tags("<table><tbody><tr></tr></tbody></table>"), "<tr></tr>");
        assert_eq!(strip_table_tags("<td><tablet>x</tablet></td>"), "<td><tablet>x</tablet></td>");
    }

    #[test]
    fn missing_timestamp_fails_whole_fragment() {
        let html = r#"<table>
          <tr data-timestamp="10"><td>A</td></tr>
          <tr><td>B</td></tr>
        </table>"#;
        let got: Result<Vec<ScheduleRow>, RowError> = ProgramFragment::parse(html).rows().collect();
        assert_eq!(got.unwrap_err(), RowError::MissingTimestamp { row: 1 });
    }

    #[test]
    fn non_numeric_timestamp_is_an_error() {
        let html = r#"<table><tr data-timestamp="soon"><td>A</td></tr></table>"#;
        let got: Result<Vec<ScheduleRow>, RowError> = ProgramFragment::parse(html).rows().collect();
        assert!(matches!(got, Err(RowError::InvalidTimestamp { row: 0, .. })));
    }
}
