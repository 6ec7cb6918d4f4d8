use crate::model::Paper;
use chrono::{Datelike, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    RelevanceDesc,
    YearDesc,
    YearAsc,
    CitationsDesc,
}

impl SortKey {
    // Unknown values fall back to the default ordering rather than erroring;
    // these arrive straight from query-string parameters.
    pub fn parse(value: &str) -> Self {
        match value {
            "year_desc" => SortKey::YearDesc,
            "year_asc" => SortKey::YearAsc,
            "citations_desc" => SortKey::CitationsDesc,
            _ => SortKey::RelevanceDesc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearWindow {
    All,
    Within(i32),
}

impl YearWindow {
    pub fn parse(value: &str) -> Self {
        match value.parse::<i32>() {
            Ok(n) if n > 0 => YearWindow::Within(n),
            _ => YearWindow::All,
        }
    }
}

/// Derives the display list: filter, then a stable sort. Pure function of its
/// inputs; the accumulated records are never reordered in place.
pub fn project(
    records: &[Paper],
    window: YearWindow,
    journal: &str,
    sort: SortKey,
    current_year: i32,
) -> Vec<Paper> {
    let journal_needle = journal.trim().to_lowercase();

    let mut out: Vec<Paper> = records
        .iter()
        .filter(|paper| match window {
            YearWindow::All => true,
            // A record with a missing or zero year never passes a window.
            YearWindow::Within(n) => {
                matches!(paper.year, Some(y) if y != 0 && y >= current_year - n)
            }
        })
        .filter(|paper| {
            if journal_needle.is_empty() {
                return true;
            }
            paper
                .source_journal
                .as_ref()
                .map(|j| j.to_lowercase().contains(&journal_needle))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    out.sort_by(|a, b| match sort {
        SortKey::RelevanceDesc => b.relevance_score.cmp(&a.relevance_score),
        SortKey::YearDesc => b.year.unwrap_or(0).cmp(&a.year.unwrap_or(0)),
        SortKey::YearAsc => a.year.unwrap_or(0).cmp(&b.year.unwrap_or(0)),
        SortKey::CitationsDesc => b.citations.unwrap_or(0).cmp(&a.citations.unwrap_or(0)),
    });
    out
}

/// `project` against the current calendar year.
pub fn project_now(records: &[Paper], window: YearWindow, journal: &str, sort: SortKey) -> Vec<Paper> {
    project(records, window, journal, sort, Local::now().year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelevanceTag;

    const YEAR: i32 = 2026;

    fn paper(title: &str, year: Option<i32>, journal: Option<&str>) -> Paper {
        Paper {
            title: title.to_string(),
            authors: Vec::new(),
            year,
            source_journal: journal.map(str::to_string),
            citations: None,
            relevance_score: 50,
            relevance_tag: RelevanceTag::default(),
            reasoning: String::new(),
            url: format!("https://example.org/{}", title),
            pdf_available: false,
        }
    }

    fn titles(records: &[Paper]) -> Vec<&str> {
        records.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn year_window_keeps_recent_and_drops_missing_years() {
        let records = vec![
            paper("recent", Some(YEAR - 3), None),
            paper("boundary", Some(YEAR - 5), None),
            paper("old", Some(YEAR - 6), None),
            paper("missing", None, None),
            paper("zero", Some(0), None),
        ];
        let kept = project(&records, YearWindow::Within(5), "", SortKey::YearAsc, YEAR);
        assert_eq!(titles(&kept), vec!["boundary", "recent"]);
    }

    #[test]
    fn all_window_keeps_records_with_missing_years() {
        let records = vec![paper("a", None, None), paper("b", Some(1999), None)];
        let kept = project(&records, YearWindow::All, "", SortKey::RelevanceDesc, YEAR);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn journal_filter_is_case_insensitive_substring() {
        let records = vec![
            paper("nat", None, Some("Nature Communications")),
            paper("sci", None, Some("Science")),
            paper("none", None, None),
        ];
        let kept = project(&records, YearWindow::All, "  nature ", SortKey::RelevanceDesc, YEAR);
        assert_eq!(titles(&kept), vec!["nat"]);
    }

    #[test]
    fn missing_citations_sort_last_under_citations_desc() {
        let mut records = vec![
            paper("none", None, None),
            paper("five", None, None),
            paper("two", None, None),
        ];
        records[1].citations = Some(5);
        records[2].citations = Some(2);
        let sorted = project(&records, YearWindow::All, "", SortKey::CitationsDesc, YEAR);
        assert_eq!(titles(&sorted), vec!["five", "two", "none"]);
    }

    #[test]
    fn relevance_desc_is_the_default_and_treats_missing_as_zero() {
        let mut records = vec![paper("low", None, None), paper("high", None, None), paper("zero", None, None)];
        records[0].relevance_score = 10;
        records[1].relevance_score = 90;
        records[2].relevance_score = 0;
        let sorted = project(&records, YearWindow::All, "", SortKey::parse("bogus"), YEAR);
        assert_eq!(titles(&sorted), vec!["high", "low", "zero"]);
    }

    #[test]
    fn projection_is_idempotent() {
        let records = vec![
            paper("a", Some(2020), Some("Nature")),
            paper("b", Some(2024), Some("Science")),
            paper("c", None, None),
        ];
        let once = project(&records, YearWindow::Within(10), "", SortKey::YearDesc, YEAR);
        let twice = project(&records, YearWindow::Within(10), "", SortKey::YearDesc, YEAR);
        assert_eq!(titles(&once), titles(&twice));
    }

    #[test]
    fn stable_sort_preserves_arrival_order_on_ties() {
        let records = vec![
            paper("first", Some(2020), None),
            paper("second", Some(2020), None),
        ];
        let sorted = project(&records, YearWindow::All, "", SortKey::YearDesc, YEAR);
        assert_eq!(titles(&sorted), vec!["first", "second"]);
    }

    #[test]
    fn window_parse_accepts_numbers_and_falls_back_to_all() {
        assert_eq!(YearWindow::parse("5"), YearWindow::Within(5));
        assert_eq!(YearWindow::parse("10"), YearWindow::Within(10));
        assert_eq!(YearWindow::parse("all"), YearWindow::All);
        assert_eq!(YearWindow::parse(""), YearWindow::All);
        assert_eq!(YearWindow::parse("-3"), YearWindow::All);
    }
}
