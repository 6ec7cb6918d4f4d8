use crate::model::Paper;
use regex::Regex;

const CSV_HEADER: &str = "Title,Authors,Year,Source Journal,Citations,Relevance Score,Relevance Tag,Reasoning,URL,PDF Available";

// RFC-4180 style: wrap a field when it contains a comma, quote, or newline,
// doubling any inner quotes. Absent values render as the empty string.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn to_csv(records: &[Paper]) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for paper in records {
        let row = [
            escape_csv_field(&paper.title),
            escape_csv_field(&paper.authors.join("; ")),
            escape_csv_field(&paper.year.map(|y| y.to_string()).unwrap_or_default()),
            escape_csv_field(paper.source_journal.as_deref().unwrap_or("")),
            escape_csv_field(&paper.citations.map(|c| c.to_string()).unwrap_or_default()),
            escape_csv_field(&paper.relevance_score.to_string()),
            escape_csv_field(paper.relevance_tag.label()),
            escape_csv_field(&paper.reasoning),
            escape_csv_field(&paper.url),
            escape_csv_field(if paper.pdf_available { "true" } else { "false" }),
        ];
        lines.push(row.join(","));
    }
    lines.join("\n")
}

/// Download filename derived from the query, whitespace collapsed to
/// underscores.
pub fn csv_filename(query: &str) -> String {
    let collapsed = Regex::new(r"\s+")
        .unwrap()
        .replace_all(query.trim(), "_")
        .to_string();
    if collapsed.is_empty() {
        "scholarstream_results.csv".to_string()
    } else {
        format!("scholarstream_{}.csv", collapsed)
    }
}

/// One-line citation for the clipboard. APA-ish; absent pieces get
/// placeholders rather than holes.
pub fn citation(paper: &Paper) -> String {
    let authors = if paper.authors.is_empty() {
        "Unknown authors".to_string()
    } else {
        paper.authors.join(", ")
    };
    let year = paper
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string());
    let journal = paper.source_journal.as_deref().unwrap_or("Unknown source");
    format!("{} ({}). {}. {}.", authors, year, paper.title, journal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelevanceTag;

    fn paper() -> Paper {
        Paper {
            title: "Streaming NDJSON at scale".to_string(),
            authors: vec!["A. One".to_string(), "B. Two".to_string()],
            year: Some(2024),
            source_journal: Some("Journal of Streams".to_string()),
            citations: Some(12),
            relevance_score: 88,
            relevance_tag: RelevanceTag::Relevant,
            reasoning: "Directly on topic.".to_string(),
            url: "https://example.org/ndjson".to_string(),
            pdf_available: true,
        }
    }

    #[test]
    fn quotes_are_doubled_and_field_wrapped() {
        let mut p = paper();
        p.title = r#"He said, "hi""#.to_string();
        let csv = to_csv(&[p]);
        assert!(csv.contains(r#""He said, ""hi""""#));
    }

    #[test]
    fn header_row_is_exact() {
        let csv = to_csv(&[]);
        assert_eq!(
            csv,
            "Title,Authors,Year,Source Journal,Citations,Relevance Score,Relevance Tag,Reasoning,URL,PDF Available"
        );
    }

    #[test]
    fn authors_join_with_semicolons_and_missing_fields_are_empty() {
        let mut p = paper();
        p.year = None;
        p.citations = None;
        p.source_journal = None;
        let csv = to_csv(&[p]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("Streaming NDJSON at scale,A. One; B. Two,,,,88,Relevant,"));
    }

    #[test]
    fn filename_collapses_whitespace() {
        assert_eq!(
            csv_filename("  quantum   computing "),
            "scholarstream_quantum_computing.csv"
        );
        assert_eq!(csv_filename("   "), "scholarstream_results.csv");
    }

    #[test]
    fn citation_joins_authors_with_commas() {
        assert_eq!(
            citation(&paper()),
            "A. One, B. Two (2024). Streaming NDJSON at scale. Journal of Streams."
        );
    }

    #[test]
    fn citation_substitutes_placeholders() {
        let mut p = paper();
        p.authors.clear();
        p.year = None;
        p.source_journal = None;
        assert_eq!(
            citation(&p),
            "Unknown authors (n.d.). Streaming NDJSON at scale. Unknown source."
        );
    }
}
