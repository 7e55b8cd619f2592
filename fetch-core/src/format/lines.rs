use crate::error::Result;
use crate::format::json::JsonFormatter;
use crate::printer::{Printer, Sequence};

/// Accumulates bytes and yields complete lines, carrying a partial tail
/// across chunks.
struct LineSplitter {
    carry: Vec<u8>,
}

impl LineSplitter {
    fn new() -> LineSplitter {
        LineSplitter { carry: Vec::new() }
    }

    /// Append a chunk and invoke `f` for every complete line (without its
    /// newline; a trailing '\r' is stripped).
    fn feed(&mut self, chunk: &[u8], mut f: impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        self.carry.extend_from_slice(chunk);
        let mut start = 0;
        while let Some(pos) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let line = &self.carry[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            f(line)?;
            start = end + 1;
        }
        self.carry.drain(..start);
        Ok(())
    }

    /// The unterminated final line, if any.
    fn rest(&mut self) -> Option<Vec<u8>> {
        if self.carry.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.carry))
        }
    }
}

/// Newline-delimited JSON: one value per line, each run through the JSON
/// formatter. A line that is not valid JSON is printed verbatim so no
/// content is ever dropped.
pub struct NdjsonFormatter {
    splitter: LineSplitter,
}

impl NdjsonFormatter {
    pub fn new() -> NdjsonFormatter {
        NdjsonFormatter {
            splitter: LineSplitter::new(),
        }
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        self.splitter.feed(chunk, |line| {
            format_json_line(line, p);
            Ok(())
        })
    }

    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        if let Some(rest) = self.splitter.rest() {
            format_json_line(&rest, p);
        }
        Ok(())
    }
}

/// Pretty-print one line as JSON, falling back to the raw bytes when the
/// line does not parse.
fn format_json_line(line: &[u8], p: &mut Printer) {
    let trimmed: &[u8] = {
        let s = line;
        let start = s.iter().position(|b| !b.is_ascii_whitespace());
        match start {
            Some(start) => &s[start..],
            None => {
                p.write_str("\n");
                return;
            }
        }
    };

    let mut probe = Printer::sink(Box::new(std::io::sink()), false);
    let mut check = JsonFormatter::new();
    let parses = check.feed(trimmed, &mut probe).is_ok() && check.finish(&mut probe).is_ok();

    if parses {
        let mut f = JsonFormatter::new();
        // The probe pass proved the line valid; feed cannot fail now.
        let _ = f.feed(trimmed, p);
        let _ = f.finish(p);
    } else {
        log::debug!("line is not valid JSON; emitting raw");
        p.write_bytes(line);
        p.write_str("\n");
    }
}

/// Server-Sent Events: `data:` payloads get the JSON treatment, the other
/// field lines (`event:`, `id:`, `retry:`, comments) render dim, and blank
/// separators pass through.
pub struct SseFormatter {
    splitter: LineSplitter,
}

impl SseFormatter {
    pub fn new() -> SseFormatter {
        SseFormatter {
            splitter: LineSplitter::new(),
        }
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        self.splitter.feed(chunk, |line| {
            render_sse_line(line, p);
            Ok(())
        })
    }

    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        if let Some(rest) = self.splitter.rest() {
            render_sse_line(&rest, p);
        }
        Ok(())
    }
}

fn render_sse_line(line: &[u8], p: &mut Printer) {
    if line.is_empty() {
        p.write_str("\n");
        return;
    }
    if let Some(payload) = strip_field(line, b"data:") {
        p.set(Sequence::Dim);
        p.write_str("data: ");
        p.reset();
        format_json_line(payload, p);
        return;
    }
    // event:, id:, retry:, and ':' comments stay on one dim line.
    p.set(Sequence::Dim);
    p.write_bytes(line);
    p.reset();
    p.write_str("\n");
}

fn strip_field<'a>(line: &'a [u8], field: &[u8]) -> Option<&'a [u8]> {
    let rest = line.strip_prefix(field)?;
    Some(rest.strip_prefix(b" ").unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn run_ndjson(input: &[u8], chunk: usize) -> String {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), false);
        let mut f = NdjsonFormatter::new();
        for piece in input.chunks(chunk.max(1)) {
            f.feed(piece, &mut p).unwrap();
        }
        f.finish(&mut p).unwrap();
        p.flush().unwrap();
        let bytes = cap.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn run_sse(input: &[u8]) -> String {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), false);
        let mut f = SseFormatter::new();
        f.feed(input, &mut p).unwrap();
        f.finish(&mut p).unwrap();
        p.flush().unwrap();
        let bytes = cap.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn ndjson_formats_each_line() {
        let out = run_ndjson(b"{\"a\":1}\n{\"b\":2}\n", 1000);
        assert_eq!(out, "{\n  \"a\": 1\n}\n{\n  \"b\": 2\n}\n");
    }

    #[test]
    fn ndjson_handles_chunk_splits() {
        let input = b"{\"a\":1}\n{\"b\":[1,2]}\n";
        let whole = run_ndjson(input, 1000);
        for chunk in [1, 3, 5] {
            assert_eq!(run_ndjson(input, chunk), whole);
        }
    }

    #[test]
    fn ndjson_invalid_line_passes_through() {
        let out = run_ndjson(b"not json\n{\"a\":1}\n", 1000);
        assert!(out.starts_with("not json\n"));
        assert!(out.contains("\"a\": 1"));
    }

    #[test]
    fn ndjson_final_unterminated_line() {
        let out = run_ndjson(b"{\"a\":1}", 1000);
        assert_eq!(out, "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn sse_data_lines_formatted_rest_dim() {
        let out = run_sse(b"event: update\nid: 7\ndata: {\"a\":1}\n\n");
        assert!(out.contains("event: update\n"));
        assert!(out.contains("id: 7\n"));
        assert!(out.contains("data: {\n  \"a\": 1\n}\n"));
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn sse_plain_data_passes_through() {
        let out = run_sse(b"data: hello world\n");
        assert_eq!(out, "data: hello world\n");
    }
}
