use unicode_width::UnicodeWidthChar;

/// What the UI owner should do after the editor consumes input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    /// The input line changed and needs a redraw.
    Redraw,
    /// Enter was pressed; send the taken buffer as a text frame.
    Submit(String),
    /// Ctrl+C or Ctrl+D: tear down and exit.
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscState {
    None,
    /// Saw ESC, deciding between a CSI sequence and a bare escape.
    Esc,
    /// Inside `ESC [ ...`; parameter bytes accumulate in `csi`.
    Csi,
}

/// Line editor for the websocket input row.
///
/// The buffer is a rune sequence with a cursor index; rendering width is
/// computed with East-Asian width tables. Incomplete UTF-8 and escape
/// sequences are held across reads, since raw-mode reads can split both.
pub struct LineEditor {
    chars: Vec<char>,
    cursor: usize,
    utf8_tail: Vec<u8>,
    esc: EscState,
    csi: Vec<u8>,
}

impl LineEditor {
    pub fn new() -> LineEditor {
        LineEditor {
            chars: Vec::new(),
            cursor: 0,
            utf8_tail: Vec::new(),
            esc: EscState::None,
            csi: Vec::new(),
        }
    }

    /// The current buffer contents.
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Display width of the text before the cursor.
    pub fn width_before_cursor(&self) -> usize {
        self.chars[..self.cursor]
            .iter()
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }

    /// Display width of the whole line.
    pub fn width(&self) -> usize {
        self.chars.iter().map(|c| c.width().unwrap_or(0)).sum()
    }

    /// Consume raw bytes from the terminal and return the resulting
    /// actions in order.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Vec<EditorAction> {
        let mut actions = Vec::new();
        for &b in bytes {
            match self.esc {
                EscState::Esc => {
                    if b == b'[' {
                        self.esc = EscState::Csi;
                        self.csi.clear();
                    } else {
                        // Bare escape followed by something else: ignore both.
                        self.esc = EscState::None;
                    }
                }
                EscState::Csi => {
                    if (0x40..=0x7e).contains(&b) {
                        let params = std::mem::take(&mut self.csi);
                        self.esc = EscState::None;
                        if let Some(action) = self.handle_csi(b, &params) {
                            actions.push(action);
                        }
                    } else {
                        self.csi.push(b);
                    }
                }
                EscState::None => match b {
                    0x1b => self.esc = EscState::Esc,
                    b'\r' | b'\n' => {
                        let line: String = self.chars.drain(..).collect();
                        self.cursor = 0;
                        actions.push(EditorAction::Submit(line));
                    }
                    0x03 | 0x04 => actions.push(EditorAction::Terminate),
                    0x7f | 0x08 => {
                        if self.cursor > 0 {
                            self.cursor -= 1;
                            self.chars.remove(self.cursor);
                            actions.push(EditorAction::Redraw);
                        }
                    }
                    0x01 => {
                        self.cursor = 0;
                        actions.push(EditorAction::Redraw);
                    }
                    0x05 => {
                        self.cursor = self.chars.len();
                        actions.push(EditorAction::Redraw);
                    }
                    0x15 => {
                        self.chars.drain(..self.cursor);
                        self.cursor = 0;
                        actions.push(EditorAction::Redraw);
                    }
                    0x17 => {
                        if self.delete_word_back() {
                            actions.push(EditorAction::Redraw);
                        }
                    }
                    _ => {
                        if self.push_utf8(b) {
                            actions.push(EditorAction::Redraw);
                        }
                    }
                },
            }
        }
        actions
    }

    fn handle_csi(&mut self, final_byte: u8, params: &[u8]) -> Option<EditorAction> {
        match final_byte {
            b'D' => {
                // Left
                if self.cursor > 0 {
                    self.cursor -= 1;
                    return Some(EditorAction::Redraw);
                }
                None
            }
            b'C' => {
                // Right
                if self.cursor < self.chars.len() {
                    self.cursor += 1;
                    return Some(EditorAction::Redraw);
                }
                None
            }
            b'H' => {
                self.cursor = 0;
                Some(EditorAction::Redraw)
            }
            b'F' => {
                self.cursor = self.chars.len();
                Some(EditorAction::Redraw)
            }
            b'~' => match params {
                b"1" | b"7" => {
                    self.cursor = 0;
                    Some(EditorAction::Redraw)
                }
                b"4" | b"8" => {
                    self.cursor = self.chars.len();
                    Some(EditorAction::Redraw)
                }
                b"3" => {
                    // Delete
                    if self.cursor < self.chars.len() {
                        self.chars.remove(self.cursor);
                        return Some(EditorAction::Redraw);
                    }
                    None
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Accumulate one byte of (possibly multi-byte) UTF-8. Returns true
    /// when a complete character was inserted.
    fn push_utf8(&mut self, b: u8) -> bool {
        // Control bytes never form characters.
        if self.utf8_tail.is_empty() && b < 0x20 {
            return false;
        }
        self.utf8_tail.push(b);
        match std::str::from_utf8(&self.utf8_tail) {
            Ok(s) => {
                let c = s.chars().next().expect("non-empty valid UTF-8");
                self.utf8_tail.clear();
                self.chars.insert(self.cursor, c);
                self.cursor += 1;
                true
            }
            Err(err) => {
                if err.error_len().is_some() {
                    // Invalid sequence: drop it rather than wedge the tail.
                    self.utf8_tail.clear();
                }
                false
            }
        }
    }

    /// Ctrl+W: delete the word before the cursor (plus trailing spaces).
    fn delete_word_back(&mut self) -> bool {
        let original = self.cursor;
        while self.cursor > 0 && self.chars[self.cursor - 1] == ' ' {
            self.cursor -= 1;
        }
        while self.cursor > 0 && self.chars[self.cursor - 1] != ' ' {
            self.cursor -= 1;
        }
        if self.cursor == original {
            return false;
        }
        self.chars.drain(self.cursor..original);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_with(text: &str) -> LineEditor {
        let mut ed = LineEditor::new();
        ed.handle_bytes(text.as_bytes());
        ed
    }

    #[test]
    fn insert_and_submit() {
        let mut ed = LineEditor::new();
        let actions = ed.handle_bytes(b"hi\r");
        assert_eq!(
            actions,
            vec![
                EditorAction::Redraw,
                EditorAction::Redraw,
                EditorAction::Submit("hi".into())
            ]
        );
        assert_eq!(ed.text(), "");
    }

    #[test]
    fn backspace_at_cursor() {
        let mut ed = editor_with("abc");
        ed.handle_bytes(&[0x7f]);
        assert_eq!(ed.text(), "ab");

        // Backspace at start is a no-op.
        let mut ed = LineEditor::new();
        assert!(ed.handle_bytes(&[0x7f]).is_empty());
    }

    #[test]
    fn arrows_and_mid_insert() {
        let mut ed = editor_with("ac");
        ed.handle_bytes(b"\x1b[D"); // left
        ed.handle_bytes(b"b");
        assert_eq!(ed.text(), "abc");
        ed.handle_bytes(b"\x1b[C"); // right
        ed.handle_bytes(b"d");
        assert_eq!(ed.text(), "abcd");
    }

    #[test]
    fn delete_key() {
        let mut ed = editor_with("abc");
        ed.handle_bytes(b"\x1b[H"); // home
        ed.handle_bytes(b"\x1b[3~"); // delete
        assert_eq!(ed.text(), "bc");
    }

    #[test]
    fn home_end_ctrl_a_e() {
        let mut ed = editor_with("xyz");
        ed.handle_bytes(&[0x01]);
        ed.handle_bytes(b"0");
        assert_eq!(ed.text(), "0xyz");
        ed.handle_bytes(&[0x05]);
        ed.handle_bytes(b"9");
        assert_eq!(ed.text(), "0xyz9");
    }

    #[test]
    fn ctrl_u_kills_to_start() {
        let mut ed = editor_with("hello world");
        ed.handle_bytes(b"\x1b[D\x1b[D"); // cursor before "ld"
        ed.handle_bytes(&[0x15]);
        assert_eq!(ed.text(), "ld");
    }

    #[test]
    fn ctrl_w_deletes_word() {
        let mut ed = editor_with("one two  ");
        ed.handle_bytes(&[0x17]);
        assert_eq!(ed.text(), "one ");
        ed.handle_bytes(&[0x17]);
        assert_eq!(ed.text(), "");
        assert!(ed.handle_bytes(&[0x17]).is_empty());
    }

    #[test]
    fn ctrl_c_and_d_terminate() {
        let mut ed = LineEditor::new();
        assert_eq!(ed.handle_bytes(&[0x03]), vec![EditorAction::Terminate]);
        assert_eq!(ed.handle_bytes(&[0x04]), vec![EditorAction::Terminate]);
    }

    #[test]
    fn split_utf8_held_across_reads() {
        let mut ed = LineEditor::new();
        let bytes = "é".as_bytes(); // two bytes
        assert!(ed.handle_bytes(&bytes[..1]).is_empty());
        assert_eq!(ed.handle_bytes(&bytes[1..]), vec![EditorAction::Redraw]);
        assert_eq!(ed.text(), "é");
    }

    #[test]
    fn split_escape_sequence_held() {
        let mut ed = editor_with("ab");
        assert!(ed.handle_bytes(b"\x1b").is_empty());
        assert!(ed.handle_bytes(b"[").is_empty());
        assert_eq!(ed.handle_bytes(b"D"), vec![EditorAction::Redraw]);
        ed.handle_bytes(b"X");
        assert_eq!(ed.text(), "aXb");
    }

    #[test]
    fn wide_characters_count_double_width() {
        let ed = editor_with("日本");
        assert_eq!(ed.width(), 4);
        assert_eq!(ed.width_before_cursor(), 4);
    }

    #[test]
    fn invalid_utf8_dropped() {
        let mut ed = LineEditor::new();
        ed.handle_bytes(&[0xff, 0xfe]);
        ed.handle_bytes(b"ok");
        assert_eq!(ed.text(), "ok");
    }
}
