use serde::{Deserialize, Serialize};

// The backend is asked for up to this many papers per query. Progress is
// reported against it, but the stream may deliver fewer or more.
pub const TARGET_RESULTS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelevanceTag {
    #[serde(rename = "Highly Relevant")]
    HighlyRelevant,
    #[serde(rename = "Relevant")]
    Relevant,
    #[serde(rename = "Moderately Relevant")]
    ModeratelyRelevant,
}

impl Default for RelevanceTag {
    fn default() -> Self {
        RelevanceTag::ModeratelyRelevant
    }
}

impl RelevanceTag {
    pub fn label(&self) -> &'static str {
        match self {
            RelevanceTag::HighlyRelevant => "Highly Relevant",
            RelevanceTag::Relevant => "Relevant",
            RelevanceTag::ModeratelyRelevant => "Moderately Relevant",
        }
    }
}

// One retrieved work, exactly as the backend streams it: one minified JSON
// object per line. Only the title is required; everything else may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub source_journal: Option<String>,
    #[serde(default)]
    pub citations: Option<u64>,
    #[serde(default)]
    pub relevance_score: u32,
    #[serde(default)]
    pub relevance_tag: RelevanceTag,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pdf_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Done,
    Failed(String),
}

// Lifecycle of one submitted query. Records are appended only by the search
// task while running; once the stream ends the session is never mutated again.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub query: String,
    pub records: Vec<Paper>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(key: String, query: String) -> Self {
        Self {
            key,
            query,
            records: Vec::new(),
            status: SessionStatus::Running,
        }
    }

    // Used when a cache hit replays a prior session's records wholesale.
    pub fn completed(key: String, query: String, records: Vec<Paper>) -> Self {
        Self {
            key,
            query,
            records,
            status: SessionStatus::Done,
        }
    }

    pub fn received(&self) -> usize {
        self.records.len()
    }

    /// User-facing estimate, not a contract on the result count.
    pub fn progress(&self) -> u32 {
        match self.status {
            SessionStatus::Running => {
                (self.records.len() * 100 / TARGET_RESULTS).min(100) as u32
            }
            _ => 100,
        }
    }

    pub fn message(&self) -> String {
        match &self.status {
            SessionStatus::Running => format!(
                "Found {} of {} results...",
                self.records.len(),
                TARGET_RESULTS
            ),
            SessionStatus::Done => format!("Search complete: {} results", self.records.len()),
            SessionStatus::Failed(reason) => format!("Search failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(title: &str) -> Paper {
        Paper {
            title: title.to_string(),
            authors: Vec::new(),
            year: None,
            source_journal: None,
            citations: None,
            relevance_score: 0,
            relevance_tag: RelevanceTag::default(),
            reasoning: String::new(),
            url: "https://example.org".to_string(),
            pdf_available: false,
        }
    }

    #[test]
    fn parses_full_record_with_camel_case_names() {
        let line = r#"{"title":"Attention Is All You Need","authors":["A. Vaswani","N. Shazeer"],"year":2017,"sourceJournal":"NeurIPS","citations":100000,"relevanceScore":97,"relevanceTag":"Highly Relevant","reasoning":"Introduces the transformer.","url":"https://arxiv.org/abs/1706.03762","pdfAvailable":true}"#;
        let paper: Paper = serde_json::from_str(line).unwrap();
        assert_eq!(paper.source_journal.as_deref(), Some("NeurIPS"));
        assert_eq!(paper.relevance_tag, RelevanceTag::HighlyRelevant);
        assert!(paper.pdf_available);
    }

    #[test]
    fn missing_optional_fields_default() {
        let line = r#"{"title":"T"}"#;
        let paper: Paper = serde_json::from_str(line).unwrap();
        assert!(paper.authors.is_empty());
        assert_eq!(paper.year, None);
        assert_eq!(paper.relevance_score, 0);
        assert_eq!(paper.relevance_tag, RelevanceTag::ModeratelyRelevant);
        assert!(paper.url.is_empty());
    }

    #[test]
    fn missing_title_is_rejected() {
        let line = r#"{"url":"https://example.org/t"}"#;
        assert!(serde_json::from_str::<Paper>(line).is_err());
    }

    #[test]
    fn progress_saturates_at_target() {
        let mut session = Session::new("k".into(), "k".into());
        assert_eq!(session.progress(), 0);
        for i in 0..9 {
            session.records.push(paper(&format!("p{}", i)));
        }
        assert_eq!(session.progress(), 100);
        session.records.truncate(2);
        assert_eq!(session.progress(), 28);
    }
}
