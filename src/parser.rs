use crate::model::Paper;

// Carry-over buffer for a text stream whose chunk boundaries do not line up
// with line boundaries. Complete lines come out of feed(); the unfinished
// tail stays buffered until more text arrives or flush() is called.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        if !self.buf.contains('\n') {
            return Vec::new();
        }
        let mut parts: Vec<String> = self.buf.split('\n').map(str::to_string).collect();
        // The final segment has no terminator yet; keep it as the new buffer.
        self.buf = parts.pop().unwrap_or_default();
        parts
    }

    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Reassembles discrete paper records from an append-only text stream.
///
/// One non-blank line is one record. A line that fails to decode is dropped
/// and counted; the stream as a whole never fails on a bad line.
#[derive(Debug, Default)]
pub struct RecordParser {
    lines: LineBuffer,
    dropped: usize,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<Paper> {
        let mut records = Vec::new();
        for line in self.lines.feed(chunk) {
            if let Some(paper) = self.parse_line(&line) {
                records.push(paper);
            }
        }
        records
    }

    // At stream end the leftover buffer may hold one last unterminated record.
    pub fn flush(&mut self) -> Option<Paper> {
        let rest = self.lines.flush()?;
        self.parse_line(&rest)
    }

    /// Count of malformed lines discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn parse_line(&mut self, line: &str) -> Option<Paper> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Paper>(line) {
            Ok(paper) => Some(paper),
            Err(_) => {
                self.dropped += 1;
                None
            }
        }
    }
}
