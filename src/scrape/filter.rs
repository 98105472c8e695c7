use super::parse::{ProgramFragment, RowError};
use super::types::ScheduleRow;

/// Case-insensitive search term. Empty or absent matches everything.
#[derive(Clone, Debug, Default)]
pub struct SearchTerm {
    needle: Option<String>,
}

impl SearchTerm {
    pub fn new(term: Option<&str>) -> Self {
        let needle = term.map(str::trim).filter(|t| !t.is_empty()).map(str::to_lowercase);
        Self { needle }
    }

    pub fn matches(&self, row: &ScheduleRow) -> bool {
        match &self.needle {
            None => true,
            Some(n) => row.searchable_text.to_lowercase().contains(n.as_str()),
        }
    }
}

/// Keep rows whose searchable text contains `term`. Row errors pass through
/// so the caller can abort on them.
pub fn filter<'t, I>(rows: I, term: &'t SearchTerm) -> impl Iterator<Item = Result<ScheduleRow, RowError>> + 't
where
    I: Iterator<Item = Result<ScheduleRow, RowError>> + 't,
{
    rows.filter(move |r| r.as_ref().map_or(true, |row| term.matches(row)))
}

/// Parse a program fragment and keep the rows matching `term`.
/// Any bad row fails the whole fragment; nothing is returned partially.
pub fn extract_matching(program_html: &str, term: &SearchTerm) -> Result<Vec<ScheduleRow>, RowError> {
    let fragment = ProgramFragment::parse(program_html);
    filter(fragment.rows(), term).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"<table>
      <tr data-timestamp="1704870000"><td class="time">08:00</td><td><a title="Daily">News</a></td></tr>
      <tr data-timestamp="1704880000"><td class="time">10:46</td><td><a title="Feature film">Movie</a></td></tr>
    </table>"#;

    #[test]
    fn empty_term_passes_everything() {
        let rows = extract_matching(PROGRAM, &SearchTerm::new(None)).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = extract_matching(PROGRAM, &SearchTerm::new(Some("  "))).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn term_is_case_insensitive() {
        let rows = extract_matching(PROGRAM, &SearchTerm::new(Some("movie"))).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "Movie");
    }

    #[test]
    fn term_matches_link_title() {
        let rows = extract_matching(PROGRAM, &SearchTerm::new(Some("FEATURE"))).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "Movie");
    }

    #[test]
    fn unknown_term_yields_nothing() {
        let rows = extract_matching(PROGRAM, &SearchTerm::new(Some("weather"))).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn bad_row_is_not_hidden_by_filter() {
        let html = r#"<table>
          <tr data-timestamp="1"><td>News</td></tr>
          <tr><td>Sport</td></tr>
        </table>"#;
        let got = extract_matching(html, &SearchTerm::new(Some("news")));
        assert!(got.is_err());
    }

    #[test]
    fn filter_over_plain_rows() {
        let rows = extract_matching(PROGRAM, &SearchTerm::new(None)).unwrap();
        let term = SearchTerm::new(Some("news"));
        let kept: Vec<ScheduleRow> = filter(rows.into_iter().map(Ok), &term).collect::<Result<_, _>>().unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].label, "News");
    }
}
