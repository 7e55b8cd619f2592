use crate::error::Result;
use crate::printer::{Printer, Sequence};

/// Streaming XML/HTML highlighter.
///
/// Pure colorizer: every input byte is emitted verbatim, so output with
/// color off is byte-identical to the input. Tag names render cyan,
/// attribute names yellow, quoted attribute values green, comments and
/// angle-bracket punctuation dim.
pub struct MarkupFormatter {
    state: MarkupState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkupState {
    Text,
    /// Just saw '<'; deciding between tag, comment, or declaration.
    TagOpen,
    /// Inside `<!--`; the u8 counts trailing '-' bytes seen.
    Comment(u8),
    /// Inside `<!DOCTYPE ...>` or `<?...?>`.
    Declaration,
    TagName,
    /// Inside a tag, between attributes.
    TagBody,
    AttrName,
    /// Inside a quoted attribute value; the byte is the quote character.
    AttrValue(u8),
}

impl MarkupFormatter {
    pub fn new() -> MarkupFormatter {
        MarkupFormatter {
            state: MarkupState::Text,
        }
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        use MarkupState::*;
        for &b in chunk {
            match self.state {
                Text => {
                    if b == b'<' {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = TagOpen;
                    } else {
                        p.write_bytes(&[b]);
                    }
                }
                TagOpen => match b {
                    b'!' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Comment(0);
                    }
                    b'?' | b'/' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = if b == b'?' { Declaration } else { TagOpen };
                    }
                    b'>' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Text;
                    }
                    _ => {
                        p.set(Sequence::Cyan);
                        p.write_bytes(&[b]);
                        self.state = TagName;
                    }
                },
                Comment(dashes) => {
                    p.set(Sequence::Dim);
                    p.write_bytes(&[b]);
                    p.reset();
                    self.state = match (b, dashes) {
                        (b'-', d) => Comment(d.saturating_add(1)),
                        (b'>', d) if d >= 2 => Text,
                        (b'>', _) => Text, // `<!DOCTYPE ...>` ends here too
                        _ => Comment(0),
                    };
                }
                Declaration => {
                    p.set(Sequence::Dim);
                    p.write_bytes(&[b]);
                    p.reset();
                    if b == b'>' {
                        self.state = Text;
                    }
                }
                TagName => match b {
                    b'>' => {
                        p.reset();
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Text;
                    }
                    b'/' => {
                        p.reset();
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = TagBody;
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => {
                        p.reset();
                        p.write_bytes(&[b]);
                        self.state = TagBody;
                    }
                    _ => p.write_bytes(&[b]),
                },
                TagBody => match b {
                    b'>' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Text;
                    }
                    b'/' | b'=' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                    }
                    b'"' | b'\'' => {
                        p.set(Sequence::Green);
                        p.write_bytes(&[b]);
                        self.state = AttrValue(b);
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => p.write_bytes(&[b]),
                    _ => {
                        p.set(Sequence::Yellow);
                        p.write_bytes(&[b]);
                        self.state = AttrName;
                    }
                },
                AttrName => match b {
                    b'=' => {
                        p.reset();
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = TagBody;
                    }
                    b'>' => {
                        p.reset();
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Text;
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => {
                        p.reset();
                        p.write_bytes(&[b]);
                        self.state = TagBody;
                    }
                    _ => p.write_bytes(&[b]),
                },
                AttrValue(quote) => {
                    p.write_bytes(&[b]);
                    if b == quote {
                        p.reset();
                        self.state = TagBody;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        // Close any open colored span from a truncated document.
        p.reset();
        Ok(())
    }
}

/// Streaming CSS highlighter: selectors cyan, property names yellow,
/// values green, punctuation and comments dim. No reflow.
pub struct CssFormatter {
    state: CssState,
    /// Nesting depth of `{}` blocks (at-rules nest).
    depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CssState {
    Selector,
    Property,
    Value,
    /// Inside `/* ... */`; the bool records a pending '*'.
    Comment(bool),
    /// Inside a quoted string in a value; the byte is the quote.
    Str(u8),
    /// Saw '/': may start a comment.
    MaybeComment,
}

impl CssFormatter {
    pub fn new() -> CssFormatter {
        CssFormatter {
            state: CssState::Selector,
            depth: 0,
        }
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        use CssState::*;
        for &b in chunk {
            match self.state {
                Selector => match b {
                    b'{' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.depth += 1;
                        self.state = Property;
                    }
                    b'/' => self.state = MaybeComment,
                    b'\n' | b';' => p.write_bytes(&[b]),
                    _ => {
                        p.set(Sequence::Cyan);
                        p.write_bytes(&[b]);
                        p.reset();
                    }
                },
                Property => match b {
                    b':' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Value;
                    }
                    b'}' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.depth = self.depth.saturating_sub(1);
                        self.state = if self.depth == 0 { Selector } else { Property };
                    }
                    b'/' => self.state = MaybeComment,
                    b';' | b' ' | b'\t' | b'\r' | b'\n' => p.write_bytes(&[b]),
                    _ => {
                        p.set(Sequence::Yellow);
                        p.write_bytes(&[b]);
                        p.reset();
                    }
                },
                Value => match b {
                    b';' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Property;
                    }
                    b'}' => {
                        p.set(Sequence::Dim);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.depth = self.depth.saturating_sub(1);
                        self.state = if self.depth == 0 { Selector } else { Property };
                    }
                    b'"' | b'\'' => {
                        p.set(Sequence::Green);
                        p.write_bytes(&[b]);
                        p.reset();
                        self.state = Str(b);
                    }
                    b'/' => self.state = MaybeComment,
                    b' ' | b'\t' | b'\r' | b'\n' => p.write_bytes(&[b]),
                    _ => {
                        p.set(Sequence::Green);
                        p.write_bytes(&[b]);
                        p.reset();
                    }
                },
                Str(quote) => {
                    p.set(Sequence::Green);
                    p.write_bytes(&[b]);
                    p.reset();
                    if b == quote {
                        self.state = Value;
                    }
                }
                MaybeComment => {
                    if b == b'*' {
                        p.set(Sequence::Dim);
                        p.write_bytes(b"/*");
                        p.reset();
                        self.state = Comment(false);
                    } else {
                        // A lone slash belongs to whatever we were doing.
                        p.write_bytes(b"/");
                        p.write_bytes(&[b]);
                        self.state = if self.depth == 0 { Selector } else { Value };
                    }
                }
                Comment(star) => {
                    p.set(Sequence::Dim);
                    p.write_bytes(&[b]);
                    p.reset();
                    self.state = match (b, star) {
                        (b'*', _) => Comment(true),
                        (b'/', true) => {
                            if self.depth == 0 {
                                Selector
                            } else {
                                Property
                            }
                        }
                        _ => Comment(false),
                    };
                }
            }
        }
        Ok(())
    }

    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        p.reset();
        Ok(())
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

    fn run_markup(input: &[u8], color: bool, chunk: usize) -> Vec<u8> {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), color);
        let mut f = MarkupFormatter::new();
        for piece in input.chunks(chunk.max(1)) {
            f.feed(piece, &mut p).unwrap();
        }
        f.finish(&mut p).unwrap();
        p.flush().unwrap();
        let out = cap.0.lock().unwrap().clone();
        out
    }

    fn run_css(input: &[u8], color: bool) -> Vec<u8> {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), color);
        let mut f = CssFormatter::new();
        f.feed(input, &mut p).unwrap();
        f.finish(&mut p).unwrap();
        p.flush().unwrap();
        let out = cap.0.lock().unwrap().clone();
        out
    }

    #[test]
    fn markup_color_off_is_identity() {
        let inputs: [&[u8]; 4] = [
            b"<root><a href=\"x\">text</a></root>",
            b"<!-- comment --><p class='c'>hi</p>",
            b"<?xml version=\"1.0\"?>\n<a/>",
            b"plain text without tags",
        ];
        for input in inputs {
            assert_eq!(run_markup(input, false, 1000), input);
            // Chunking must not change the bytes either.
            assert_eq!(run_markup(input, false, 1), input);
        }
    }

    #[test]
    fn markup_colors_tag_names() {
        let out = run_markup(b"<a>x</a>", true, 1000);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\x1b[36ma"));
        assert!(text.contains("\x1b[2m<"));
    }

    #[test]
    fn markup_attr_values_green() {
        let out = run_markup(b"<a href=\"u\">", true, 1000);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\x1b[33mh"), "attr name yellow: {text:?}");
        assert!(text.contains("\x1b[32m\"u\""), "attr value green: {text:?}");
    }

    #[test]
    fn css_color_off_is_identity() {
        let inputs: [&[u8]; 3] = [
            b".cls { color: red; }",
            b"/* c */ a:hover { margin: 0 1px; }",
            b"@media screen { body { font: \"X\"; } }",
        ];
        for input in inputs {
            assert_eq!(run_css(input, false), input);
        }
    }

    #[test]
    fn css_property_and_value_colors() {
        let out = run_css(b"a{b:c}", true);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\x1b[36ma"), "selector cyan: {text:?}");
        assert!(text.contains("\x1b[33mb"), "property yellow: {text:?}");
        assert!(text.contains("\x1b[32mc"), "value green: {text:?}");
    }
}
