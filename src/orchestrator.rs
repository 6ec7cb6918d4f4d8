use crate::backend::Backend;
use crate::model::{Paper, TARGET_RESULTS};
use crate::parser::RecordParser;
use crate::web::LogBuffer;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

const SYSTEM_INSTRUCTION: &str = "You are an AI research assistant optimized for speed. \
Your primary goal is to return the requested JSON data as quickly and concisely as \
possible while maintaining accuracy.";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("please enter a search topic")]
    EmptyQuery,
    #[error("search backend error: {0}")]
    Backend(#[source] anyhow::Error),
    #[error("the result stream stalled for more than {0} seconds")]
    Stalled(u64),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchSummary {
    pub received: usize,
    pub dropped: usize,
}

// Owns one backend and runs one search at a time over it. Parsed records are
// handed to the caller's callback in stream order, synchronously, on the
// single task driving the stream.
pub struct Searcher {
    backend: Backend,
    stall_timeout: Duration,
    logs: Option<LogBuffer>,
}

impl Searcher {
    pub fn new(backend: Backend, stall_timeout: Duration) -> Self {
        Self {
            backend,
            stall_timeout,
            logs: None,
        }
    }

    pub fn with_logger(backend: Backend, stall_timeout: Duration, logs: LogBuffer) -> Self {
        Self {
            backend,
            stall_timeout,
            logs: Some(logs),
        }
    }

    fn log(&self, message: &str) {
        match &self.logs {
            Some(logs) => crate::web::add_log(logs, message),
            None => println!("{}", message),
        }
    }

    /// Runs one search, invoking `on_paper` for every record as soon as its
    /// line completes. Records already delivered stay with the caller even if
    /// the stream later fails.
    pub async fn search(
        &self,
        query: &str,
        mut on_paper: impl FnMut(Paper),
    ) -> Result<SearchSummary, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let prompt = build_prompt(query);
        let mut stream = self
            .backend
            .open(SYSTEM_INSTRUCTION, &prompt)
            .await
            .map_err(SearchError::Backend)?;

        let mut parser = RecordParser::new();
        let mut summary = SearchSummary::default();
        let stall = self.stall_timeout.as_secs().max(1);

        loop {
            let next = timeout(self.stall_timeout, stream.next_chunk())
                .await
                .map_err(|_| SearchError::Stalled(stall))?;
            let chunk = match next {
                Some(chunk) => chunk.map_err(SearchError::Backend)?,
                None => break,
            };

            let before = parser.dropped();
            for paper in parser.feed(&chunk) {
                summary.received += 1;
                self.log(&format!(
                    "Result {} of {}: {}",
                    summary.received, TARGET_RESULTS, paper.title
                ));
                on_paper(paper);
            }
            for _ in before..parser.dropped() {
                self.log("Discarded a malformed result line");
            }
        }

        if let Some(paper) = parser.flush() {
            summary.received += 1;
            self.log(&format!(
                "Result {} of {}: {}",
                summary.received, TARGET_RESULTS, paper.title
            ));
            on_paper(paper);
        }

        summary.dropped = parser.dropped();
        if summary.dropped > 0 {
            self.log(&format!(
                "Stream finished: {} records, {} malformed lines dropped",
                summary.received, summary.dropped
            ));
        }
        Ok(summary)
    }
}

// The fixed instruction payload. The backend is asked for newline-delimited
// minified JSON so records can render the moment each line completes.
fn build_prompt(query: &str) -> String {
    format!(
        r#"You are a high-speed academic research assistant. Your goal is to find relevant scientific papers via web search and return results as fast as possible.

For each paper, stream back one single, valid, minified JSON object on its own line.
- DO NOT use markdown.
- DO NOT use a JSON array wrapper.
- Stream each result instantly.

JSON structure:
{{
  "title": "Paper Title",
  "authors": ["Author One", "Author Two"],
  "year": 2024,
  "sourceJournal": "Journal Name",
  "citations": 13,
  "relevanceScore": 95,
  "relevanceTag": "Highly Relevant",
  "reasoning": "A very brief, one-sentence justification for relevance.",
  "url": "Direct URL to paper",
  "pdfAvailable": true
}}

- "relevanceScore" is an integer from 0 to 100.
- "relevanceTag" is one of "Highly Relevant", "Relevant", "Moderately Relevant".
- Find the top {target} most relevant papers.
- Prioritize speed above all else. A quick, relevant result is better than a perfect, slow one.
- If a field like "citations" or "authors" is not found, omit it.
- If no papers are found, end the stream.

User Query: "{query}""#,
        target = TARGET_RESULTS,
        query = query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(chunks: &[&str]) -> Searcher {
        Searcher::new(
            Backend::Scripted(chunks.iter().map(|c| c.to_string()).collect()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn blank_query_fails_before_any_stream_is_opened() {
        let searcher = scripted(&["should never be read"]);
        let err = searcher.search("   ", |_| {}).await.unwrap_err();
        assert!(matches!(err, SearchError::EmptyQuery));
    }

    #[tokio::test]
    async fn records_arrive_through_the_callback_in_line_order() {
        let searcher = scripted(&[
            "{\"title\":\"A\",\"url\":\"https://example.org/a\"}\n{\"tit",
            "le\":\"B\",\"url\":\"https://example.org/b\"}\n",
        ]);
        let mut seen = Vec::new();
        let summary = searcher
            .search("quantum computing", |p| seen.push(p.title))
            .await
            .unwrap();
        assert_eq!(seen, vec!["A", "B"]);
        assert_eq!(summary.received, 2);
        assert_eq!(summary.dropped, 0);
    }

    #[tokio::test]
    async fn trailing_record_without_newline_is_flushed() {
        let searcher = scripted(&[
            "{\"title\":\"A\",\"url\":\"https://example.org/a\"}\n",
            "{\"title\":\"Last\",\"url\":\"https://example.org/last\"}",
        ]);
        let mut seen = Vec::new();
        let summary = searcher.search("q", |p| seen.push(p.title)).await.unwrap();
        assert_eq!(seen, vec!["A", "Last"]);
        assert_eq!(summary.received, 2);
    }

    #[tokio::test]
    async fn malformed_lines_are_counted_not_fatal() {
        let searcher = scripted(&[
            "garbage line\n{\"title\":\"A\",\"url\":\"https://example.org/a\"}\n{broken\n",
        ]);
        let mut seen = Vec::new();
        let summary = searcher.search("q", |p| seen.push(p.title)).await.unwrap();
        assert_eq!(seen, vec!["A"]);
        assert_eq!(summary.dropped, 2);
    }

    #[test]
    fn prompt_embeds_the_raw_query() {
        let prompt = build_prompt("perovskite solar cells");
        assert!(prompt.contains("User Query: \"perovskite solar cells\""));
        assert!(prompt.contains("top 7 most relevant papers"));
    }
}
