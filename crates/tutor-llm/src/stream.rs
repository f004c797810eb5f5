/// Parse a single line of a provider's line-delimited event stream.
/// SSE format: `event: <type>` or `data: <json>`; everything else (blank
/// lines, comments) is ignored by the caller,
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .or_else(|| line.strip_prefix("data:"))
            .map(|data| SseParsed::Data(data.trim_start().to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// Accumulates raw bytes from an HTTP streaming body into complete lines,
/// tolerating chunk boundaries that split a line in the middle.
#[derive(Default)]
pub struct LineAccumulator {
    buf: String,
}

impl LineAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns the complete lines now available,
    /// retaining any trailing partial line for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return Vec::new();
        };
        self.buf.push_str(text);
        let mut lines: Vec<&str> = self.buf.split('\n').collect();
        let remainder = lines.pop().unwrap_or("").to_string();
        let complete: Vec<String> = lines
            .into_iter()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        self.buf = remainder;
        complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_data_lines() {
        assert!(matches!(
            parse_sse_line("event: message_start"),
            Some(SseParsed::Event(e)) if e == "message_start"
        ));
        assert!(matches!(
            parse_sse_line("data: {\"a\":1}"),
            Some(SseParsed::Data(d)) if d == "{\"a\":1}"
        ));
    }

    #[test]
    fn ignores_non_prefixed_lines() {
        assert!(parse_sse_line(": comment").is_none());
        assert!(parse_sse_line("").is_none());
    }

    #[test]
    fn accumulator_handles_split_chunks() {
        let mut acc = LineAccumulator::new();
        let first = acc.push(b"data: {\"a\":");
        assert!(first.is_empty());
        let second = acc.push(b"1}\ndata: next\n");
        assert_eq!(second, vec!["data: {\"a\":1}", "data: next"]);
    }
}
