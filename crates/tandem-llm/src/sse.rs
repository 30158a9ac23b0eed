//! Incremental server-sent-events parsing
//!
//! Both streaming backends deliver fragments as `data:` lines over a
//! chunked body. The parser is fed raw byte chunks (which can split lines
//! arbitrarily) and yields complete data payloads in arrival order.

/// Accumulates body bytes and extracts complete `data:` payloads.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buf: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk; returns the data payloads completed by it.
    ///
    /// Non-data lines (event names, comments, blank keep-alives) are
    /// skipped. A trailing partial line stays buffered for the next chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_line() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: {\"text\":\"hi\"}\n\n");
        assert_eq!(payloads, vec![r#"{"text":"hi"}"#]);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"te").is_empty());
        let payloads = parser.feed(b"xt\":\"hi\"}\n");
        assert_eq!(payloads, vec![r#"{"text":"hi"}"#]);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: one\n\ndata: two\n");
        assert_eq!(payloads, vec!["one", "two"]);
    }

    #[test]
    fn test_ignores_non_data_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"event: ping\n: comment\n\ndata: real\n");
        assert_eq!(payloads, vec!["real"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: windows\r\n");
        assert_eq!(payloads, vec!["windows"]);
    }
}
