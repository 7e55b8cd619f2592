use crate::error::Result;
use crate::printer::{Printer, Sequence};

/// Line-oriented YAML colorizer: keys cyan, values as given, comments and
/// punctuation dim. No reflow; color off is byte-identity.
pub struct YamlFormatter {
    carry: Vec<u8>,
}

impl YamlFormatter {
    pub fn new() -> YamlFormatter {
        YamlFormatter { carry: Vec::new() }
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        self.carry.extend_from_slice(chunk);
        let mut start = 0;
        while let Some(pos) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            render_yaml_line(&self.carry[start..end], p);
            p.write_str("\n");
            start = end + 1;
        }
        self.carry.drain(..start);
        Ok(())
    }

    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            render_yaml_line(&line, p);
        }
        Ok(())
    }
}

fn render_yaml_line(line: &[u8], p: &mut Printer) {
    // Comment lines (and document markers) render dim wholesale.
    let trimmed_start = line.iter().take_while(|b| **b == b' ').count();
    let rest = &line[trimmed_start..];
    if rest.starts_with(b"#") || rest == b"---" || rest == b"..." {
        p.set(Sequence::Dim);
        p.write_bytes(line);
        p.reset();
        return;
    }

    p.write_bytes(&line[..trimmed_start]);
    let mut rest = rest;

    // Leading sequence dashes are punctuation.
    while let Some(stripped) = rest.strip_prefix(b"- ") {
        p.set(Sequence::Dim);
        p.write_bytes(b"- ");
        p.reset();
        rest = stripped;
    }

    // `key:` followed by end-of-line or a space is a mapping entry.
    if let Some(colon) = find_yaml_key_colon(rest) {
        p.set(Sequence::Cyan);
        p.write_bytes(&rest[..colon]);
        p.reset();
        p.set(Sequence::Dim);
        p.write_bytes(b":");
        p.reset();
        p.set(Sequence::Green);
        p.write_bytes(&rest[colon + 1..]);
        p.reset();
    } else {
        p.set(Sequence::Green);
        p.write_bytes(rest);
        p.reset();
    }
}

/// Position of the colon terminating a plain mapping key, if this line
/// looks like `key: value` or `key:`. Quoted and flow content is left
/// uncolored rather than mis-colored.
fn find_yaml_key_colon(rest: &[u8]) -> Option<usize> {
    if rest.starts_with(b"\"") || rest.starts_with(b"'") {
        return None;
    }
    let pos = rest.iter().position(|&b| b == b':')?;
    match rest.get(pos + 1) {
        None | Some(b' ') => Some(pos),
        _ => None,
    }
}

/// CSV colorizer: the header row renders bold, field separators dim.
/// Quoted fields (including embedded commas) pass through intact.
pub struct CsvFormatter {
    carry: Vec<u8>,
    first_line: bool,
}

impl CsvFormatter {
    pub fn new() -> CsvFormatter {
        CsvFormatter {
            carry: Vec::new(),
            first_line: true,
        }
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        self.carry.extend_from_slice(chunk);
        let mut start = 0;
        while let Some(pos) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let header = self.first_line;
            self.first_line = false;
            render_csv_line(&self.carry[start..end], header, p);
            p.write_str("\n");
            start = end + 1;
        }
        self.carry.drain(..start);
        Ok(())
    }

    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            let header = self.first_line;
            render_csv_line(&line, header, p);
        }
        Ok(())
    }
}

fn render_csv_line(line: &[u8], header: bool, p: &mut Printer) {
    let mut in_quotes = false;
    for &b in line {
        match b {
            b'"' => {
                in_quotes = !in_quotes;
                emit_csv_byte(b, header, p);
            }
            b',' if !in_quotes => {
                p.set(Sequence::Dim);
                p.write_bytes(b",");
                p.reset();
            }
            _ => emit_csv_byte(b, header, p),
        }
    }
}

fn emit_csv_byte(b: u8, header: bool, p: &mut Printer) {
    if header {
        p.set(Sequence::Bold);
        p.write_bytes(&[b]);
        p.reset();
    } else {
        p.write_bytes(&[b]);
    }
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

    fn run_yaml(input: &[u8], color: bool) -> Vec<u8> {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), color);
        let mut f = YamlFormatter::new();
        f.feed(input, &mut p).unwrap();
        f.finish(&mut p).unwrap();
        p.flush().unwrap();
        let out = cap.0.lock().unwrap().clone();
        out
    }

    fn run_csv(input: &[u8], color: bool) -> Vec<u8> {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), color);
        let mut f = CsvFormatter::new();
        f.feed(input, &mut p).unwrap();
        f.finish(&mut p).unwrap();
        p.flush().unwrap();
        let out = cap.0.lock().unwrap().clone();
        out
    }

    #[test]
    fn yaml_color_off_is_identity() {
        let inputs: [&[u8]; 3] = [
            b"key: value\nlist:\n  - a\n  - b\n",
            b"# comment\n---\nname: fetch\n",
            b"plain scalar line\n",
        ];
        for input in inputs {
            assert_eq!(run_yaml(input, false), input);
        }
    }

    #[test]
    fn yaml_keys_colored() {
        let out = String::from_utf8(run_yaml(b"key: value\n", true)).unwrap();
        assert!(out.contains("\x1b[36mkey"), "got: {out:?}");
        assert!(out.contains("\x1b[32m value"), "got: {out:?}");
    }

    #[test]
    fn yaml_url_value_not_split_as_key() {
        // "http://x" contains a colon not followed by space; the line is a
        // scalar, not a mapping.
        let out = String::from_utf8(run_yaml(b"http://x\n", true)).unwrap();
        assert!(!out.contains("\x1b[36m"), "got: {out:?}");
    }

    #[test]
    fn csv_color_off_is_identity() {
        let inputs: [&[u8]; 2] = [
            b"name,age\nalice,30\nbob,41\n",
            b"a,\"quoted, comma\",c\n1,2,3\n",
        ];
        for input in inputs {
            assert_eq!(run_csv(input, false), input);
        }
    }

    #[test]
    fn csv_header_bold_separators_dim() {
        let out = String::from_utf8(run_csv(b"a,b\n1,2\n", true)).unwrap();
        assert!(out.contains("\x1b[1ma"), "header bold: {out:?}");
        assert!(out.contains("\x1b[2m,"), "separator dim: {out:?}");
        // Data rows are plain.
        assert!(out.contains("\n1"), "got: {out:?}");
    }

    #[test]
    fn csv_quoted_commas_not_treated_as_separators() {
        let out = String::from_utf8(run_csv(b"x\n\"a,b\",c\n", true)).unwrap();
        // Only the comma outside quotes is dimmed.
        assert_eq!(out.matches("\x1b[2m,").count(), 1, "got: {out:?}");
    }
}
