use crate::error::{Error, Result};
use crate::printer::{Printer, Sequence};

/// Streaming JSON pretty-printer.
///
/// A token scanner rather than a DOM: bytes are colorized and re-indented
/// as they arrive, so arbitrarily large documents format in constant
/// memory. Key order and every token's exact bytes are preserved; only
/// whitespace is rewritten (2-space indent).
///
/// Colors: keys cyan, strings green, numbers yellow, `true`/`false`/`null`
/// magenta, structural characters dim.
pub struct JsonFormatter {
    state: State,
    /// Object/array nesting; `true` = object frame.
    stack: Vec<Frame>,
    /// Whitespace owed before the next token.
    sep: Sep,
    /// Carry buffer for a number or literal split across chunks.
    token: Vec<u8>,
    /// Set once the root value has closed; trailing input must be blank.
    done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between tokens.
    Idle,
    /// Inside a string; `key` selects the color, `escape` tracks a pending
    /// backslash at a chunk boundary.
    InString { key: bool, escape: bool },
    InNumber,
    InLiteral,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    object: bool,
    /// In an object frame: whether the next string is a key.
    expect_key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sep {
    /// Start of input.
    None,
    /// Just opened a container; emit newline+indent unless it closes
    /// immediately.
    Open,
    /// After a comma.
    Comma,
    /// After a colon.
    Colon,
    /// After a complete value at depth 0.
    Root,
}

impl JsonFormatter {
    pub fn new() -> JsonFormatter {
        JsonFormatter {
            state: State::Idle,
            stack: Vec::new(),
            sep: Sep::None,
            token: Vec::new(),
            done: false,
        }
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        let mut i = 0;
        while i < chunk.len() {
            match self.state {
                State::InString { key, escape } => {
                    i += self.string_bytes(&chunk[i..], key, escape, p);
                }
                State::InNumber | State::InLiteral => {
                    i += self.token_bytes(&chunk[i..], p)?;
                }
                State::Idle => {
                    let b = chunk[i];
                    i += 1;
                    self.idle_byte(b, p)?;
                }
            }
        }
        Ok(())
    }

    /// Flush any token still carried and verify the document completed.
    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        match self.state {
            State::InNumber | State::InLiteral => {
                self.end_token(p)?;
            }
            State::InString { .. } => {
                return Err(Error::Format("unterminated string in JSON input".into()));
            }
            State::Idle => {}
        }
        if !self.stack.is_empty() || !self.done {
            return Err(Error::Format("truncated JSON input".into()));
        }
        p.write_str("\n");
        Ok(())
    }

    // -- Idle-state dispatch --------------------------------------------------

    fn idle_byte(&mut self, b: u8, p: &mut Printer) -> Result<()> {
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => Ok(()),
            _ if self.done => Err(Error::Format(
                "unexpected trailing data after JSON document".into(),
            )),
            b'{' | b'[' => {
                self.before_value(p)?;
                self.structural(b, p);
                self.stack.push(Frame {
                    object: b == b'{',
                    expect_key: b == b'{',
                });
                self.sep = Sep::Open;
                Ok(())
            }
            b'}' | b']' => {
                let frame = self
                    .stack
                    .pop()
                    .ok_or_else(|| Error::Format("unbalanced close in JSON input".into()))?;
                if frame.object != (b == b'}') {
                    return Err(Error::Format("mismatched close in JSON input".into()));
                }
                if self.sep == Sep::Open {
                    // Empty container closes on the same line.
                } else {
                    p.write_str("\n");
                    self.indent(p);
                }
                self.structural(b, p);
                self.value_done();
                Ok(())
            }
            b',' => {
                self.structural(b, p);
                if let Some(frame) = self.stack.last_mut() {
                    if frame.object {
                        frame.expect_key = true;
                    }
                } else {
                    return Err(Error::Format("comma outside of a container".into()));
                }
                self.sep = Sep::Comma;
                Ok(())
            }
            b':' => {
                let valid = self
                    .stack
                    .last()
                    .is_some_and(|frame| frame.object && !frame.expect_key);
                if !valid {
                    return Err(Error::Format("unexpected ':' in JSON input".into()));
                }
                self.structural(b, p);
                self.sep = Sep::Colon;
                Ok(())
            }
            b'"' => {
                self.before_value(p)?;
                let key = self
                    .stack
                    .last()
                    .is_some_and(|frame| frame.object && frame.expect_key);
                p.set(if key { Sequence::Cyan } else { Sequence::Green });
                p.write_bytes(b"\"");
                self.state = State::InString { key, escape: false };
                Ok(())
            }
            b'-' | b'0'..=b'9' => {
                self.before_value(p)?;
                self.token.push(b);
                self.state = State::InNumber;
                Ok(())
            }
            b't' | b'f' | b'n' => {
                self.before_value(p)?;
                self.token.push(b);
                self.state = State::InLiteral;
                Ok(())
            }
            other => Err(Error::Format(format!(
                "unexpected byte 0x{other:02x} in JSON input"
            ))),
        }
    }

    /// Emit the whitespace owed before a value or key token.
    fn before_value(&mut self, p: &mut Printer) -> Result<()> {
        match self.sep {
            Sep::None => {}
            Sep::Open | Sep::Comma => {
                p.write_str("\n");
                self.indent(p);
            }
            Sep::Colon => p.write_str(" "),
            Sep::Root => {
                return Err(Error::Format(
                    "unexpected trailing data after JSON document".into(),
                ));
            }
        }
        self.sep = Sep::None;
        Ok(())
    }

    fn indent(&mut self, p: &mut Printer) {
        for _ in 0..self.stack.len() {
            p.write_str("  ");
        }
    }

    fn structural(&mut self, b: u8, p: &mut Printer) {
        p.set(Sequence::Dim);
        p.write_bytes(&[b]);
        p.reset();
    }

    /// Bookkeeping after a complete value (scalar or closed container).
    fn value_done(&mut self) {
        match self.stack.last_mut() {
            Some(frame) => {
                if frame.object {
                    frame.expect_key = false;
                }
                self.sep = Sep::None;
            }
            None => {
                self.done = true;
                self.sep = Sep::Root;
            }
        }
    }

    // -- String streaming -----------------------------------------------------

    /// Consume string bytes, returning how many were used. The opening
    /// quote and color were emitted on entry; content streams through
    /// verbatim, including escapes.
    fn string_bytes(&mut self, chunk: &[u8], key: bool, mut escape: bool, p: &mut Printer) -> usize {
        let mut used = 0;
        for &b in chunk {
            used += 1;
            if escape {
                p.write_bytes(&[b]);
                escape = false;
                continue;
            }
            match b {
                b'\\' => {
                    p.write_bytes(&[b]);
                    escape = true;
                }
                b'"' => {
                    p.write_bytes(&[b]);
                    p.reset();
                    self.state = State::Idle;
                    if key {
                        // Key complete: the frame now expects ':' + value.
                        if let Some(frame) = self.stack.last_mut() {
                            frame.expect_key = false;
                        }
                        self.sep = Sep::None;
                    } else {
                        self.value_done();
                    }
                    return used;
                }
                _ => p.write_bytes(&[b]),
            }
        }
        self.state = State::InString { key, escape };
        used
    }

    // -- Number / literal streaming -------------------------------------------

    /// Accumulate a number or literal until a delimiter, then emit it in
    /// one colored span. Returns bytes consumed, not including the
    /// delimiter (which is reprocessed in the idle state).
    fn token_bytes(&mut self, chunk: &[u8], p: &mut Printer) -> Result<usize> {
        let mut used = 0;
        for &b in chunk {
            let part_of_token = match self.state {
                State::InNumber => {
                    matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
                }
                State::InLiteral => b.is_ascii_lowercase(),
                _ => unreachable!("token_bytes only runs for number/literal states"),
            };
            if part_of_token {
                self.token.push(b);
                used += 1;
            } else {
                self.end_token(p)?;
                return Ok(used);
            }
        }
        Ok(used)
    }

    fn end_token(&mut self, p: &mut Printer) -> Result<()> {
        let token = std::mem::take(&mut self.token);
        match self.state {
            State::InNumber => {
                p.set(Sequence::Yellow);
                p.write_bytes(&token);
                p.reset();
            }
            State::InLiteral => {
                if !matches!(token.as_slice(), b"true" | b"false" | b"null") {
                    return Err(Error::Format(format!(
                        "invalid literal '{}' in JSON input",
                        String::from_utf8_lossy(&token)
                    )));
                }
                p.set(Sequence::Magenta);
                p.write_bytes(&token);
                p.reset();
            }
            _ => unreachable!("end_token only runs for number/literal states"),
        }
        self.state = State::Idle;
        self.value_done();
        Ok(())
    }
}
