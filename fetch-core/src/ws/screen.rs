use std::collections::VecDeque;

use unicode_width::UnicodeWidthChar;

use crate::printer::{Printer, Sequence};
use crate::ws::editor::LineEditor;

/// Terminals shorter than this cannot host the chrome; the TUI falls back
/// to plain stream mode.
pub const MIN_ROWS: u16 = 5;

/// Replay buffer cap for resize redraws.
pub const RING_CAP: usize = 10_000;

/// Prompt glyph on the input line.
const PROMPT: &str = "› ";

/// One logged message, already prefixed (`→ `, `← `, or a notice).
#[derive(Debug, Clone)]
pub struct LogLine {
    pub text: String,
    pub dim: bool,
}

/// Screen state for the websocket TUI: the terminal grid, the message
/// ring, and the input editor.
///
/// Owned by the UI task behind a mutex; every escape sequence written to
/// the terminal goes through here, and the input line is redrawn only
/// after message renders.
pub struct Screen {
    pub rows: u16,
    pub cols: u16,
    pub editor: LineEditor,
    ring: VecDeque<LogLine>,
}

impl Screen {
    pub fn new(cols: u16, rows: u16) -> Screen {
        Screen {
            rows,
            cols,
            editor: LineEditor::new(),
            ring: VecDeque::new(),
        }
    }

    /// Rows 1..=region_bottom scroll; the chrome sits below.
    fn region_bottom(&self) -> u16 {
        self.rows.saturating_sub(3).max(1)
    }

    fn separator_row(&self) -> u16 {
        self.rows.saturating_sub(2)
    }

    fn input_row(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    /// Establish the scroll region and draw the chrome. `cursor_row` is
    /// where the terminal cursor currently sits; existing output scrolls
    /// up if it would collide with the input line.
    pub fn setup(&mut self, p: &mut Printer, cursor_row: u16) {
        let region_bottom = self.region_bottom();
        if cursor_row > region_bottom {
            // Push prior shell output into scrollback.
            let lines = cursor_row - region_bottom;
            for _ in 0..lines {
                p.write_str("\n");
            }
        }
        self.draw_chrome(p);
        self.draw_input(p);
    }

    /// Scroll region + separators + input line, from scratch.
    fn draw_chrome(&mut self, p: &mut Printer) {
        p.write_str(&format!("\x1b[1;{}r", self.region_bottom()));
        let sep: String = "─".repeat(self.cols as usize);
        for row in [self.separator_row(), self.rows] {
            p.write_str(&format!("\x1b[{row};1H\x1b[2K"));
            p.set(Sequence::Dim);
            p.write_str(&sep);
            p.reset();
        }
    }

    /// Append a message to the scroll region and remember it for replay.
    /// The input line is redrawn afterwards so the cursor never lingers in
    /// the region.
    pub fn push_message(&mut self, p: &mut Printer, line: LogLine) {
        if self.ring.len() == RING_CAP {
            self.ring.pop_front();
        }
        self.ring.push_back(line.clone());
        self.render_message(p, &line);
        self.draw_input(p);
    }

    fn render_message(&mut self, p: &mut Printer, line: &LogLine) {
        let bottom = self.region_bottom();
        // Writing a newline at the bottom of the scroll region scrolls it.
        p.write_str(&format!("\x1b[{bottom};1H\n"));
        if line.dim {
            p.set(Sequence::Dim);
        }
        p.write_str(&clip(&line.text, self.cols as usize));
        if line.dim {
            p.reset();
        }
    }

    /// Redraw the input line and place the cursor.
    pub fn draw_input(&mut self, p: &mut Printer) {
        let row = self.input_row();
        p.write_str(&format!("\x1b[{row};1H\x1b[2K"));
        p.set(Sequence::Cyan);
        p.write_str(PROMPT);
        p.reset();

        let budget = (self.cols as usize).saturating_sub(PROMPT_WIDTH + 1);
        let text = self.editor.text();
        p.write_str(&clip(&text, budget));

        let cursor_col = PROMPT_WIDTH + 1 + self.editor.width_before_cursor().min(budget);
        p.write_str(&format!("\x1b[{row};{cursor_col}H"));
    }

    /// Handle a terminal resize: reset the region, redraw the chrome, and
    /// replay the tail of the ring into the fresh region.
    pub fn resize(&mut self, p: &mut Printer, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        p.write_str("\x1b[r\x1b[2J");
        self.draw_chrome(p);
        let replay: Vec<LogLine> = self
            .ring
            .iter()
            .rev()
            .take(self.region_bottom() as usize)
            .cloned()
            .collect();
        for line in replay.into_iter().rev() {
            self.render_message(p, &line);
        }
        self.draw_input(p);
    }

    /// Restore normal terminal state: reset the scroll region and park the
    /// cursor just below the last message.
    pub fn teardown(&mut self, p: &mut Printer) {
        p.write_str("\x1b[r");
        let row = self.region_bottom().saturating_add(1);
        p.write_str(&format!("\x1b[{row};1H\x1b[2K\n"));
    }
}

const PROMPT_WIDTH: usize = 2;

/// Truncate a string to a display-cell budget.
fn clip(s: &str, budget: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        out.push(c);
    }
    out
}

/// Parse a DSR cursor-position report: `ESC [ row ; col R`. Returns the
/// row.
pub fn parse_cursor_report(bytes: &[u8]) -> Option<u16> {
    let start = bytes.windows(2).position(|w| w == b"\x1b[")?;
    let rest = &bytes[start + 2..];
    let end = rest.iter().position(|&b| b == b'R')?;
    let body = std::str::from_utf8(&rest[..end]).ok()?;
    let (row, _col) = body.split_once(';')?;
    row.parse().ok()
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

    fn capture() -> (Printer, Capture) {
        let cap = Capture::default();
        (Printer::sink(Box::new(cap.clone()), false), cap)
    }

    fn output(cap: &Capture, p: &mut Printer) -> String {
        p.flush().unwrap();
        String::from_utf8(cap.0.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn chrome_rows_for_24_line_terminal() {
        let screen = Screen::new(80, 24);
        assert_eq!(screen.region_bottom(), 21);
        assert_eq!(screen.separator_row(), 22);
        assert_eq!(screen.input_row(), 23);
    }

    #[test]
    fn setup_sets_scroll_region() {
        let (mut p, cap) = capture();
        let mut screen = Screen::new(80, 24);
        screen.setup(&mut p, 1);
        let out = output(&cap, &mut p);
        assert!(out.contains("\x1b[1;21r"), "got: {out:?}");
        assert!(out.contains("\x1b[23;1H"), "input row drawn: {out:?}");
    }

    #[test]
    fn messages_scroll_at_region_bottom() {
        let (mut p, cap) = capture();
        let mut screen = Screen::new(80, 24);
        screen.push_message(
            &mut p,
            LogLine {
                text: "→ hi".into(),
                dim: false,
            },
        );
        let out = output(&cap, &mut p);
        assert!(out.contains("\x1b[21;1H\n→ hi"), "got: {out:?}");
        // Input line redrawn after the message.
        let msg_pos = out.find("→ hi").unwrap();
        let input_pos = out.rfind("\x1b[23;1H").unwrap();
        assert!(input_pos > msg_pos);
    }

    #[test]
    fn ring_caps_at_limit() {
        let (mut p, _cap) = capture();
        let mut screen = Screen::new(80, 24);
        for i in 0..(RING_CAP + 5) {
            screen.push_message(
                &mut p,
                LogLine {
                    text: format!("m{i}"),
                    dim: false,
                },
            );
        }
        assert_eq!(screen.ring.len(), RING_CAP);
        assert_eq!(screen.ring.front().unwrap().text, "m5");
    }

    #[test]
    fn resize_replays_recent_messages() {
        let (mut p, cap) = capture();
        let mut screen = Screen::new(80, 24);
        for i in 0..3 {
            screen.push_message(
                &mut p,
                LogLine {
                    text: format!("msg{i}"),
                    dim: false,
                },
            );
        }
        cap.0.lock().unwrap().clear();
        screen.resize(&mut p, 100, 30);
        let out = output(&cap, &mut p);
        assert!(out.starts_with("\x1b[r"), "region reset first: {out:?}");
        assert!(out.contains("\x1b[1;27r"), "new region: {out:?}");
        for i in 0..3 {
            assert!(out.contains(&format!("msg{i}")));
        }
    }

    #[test]
    fn teardown_resets_region() {
        let (mut p, cap) = capture();
        let mut screen = Screen::new(80, 24);
        screen.teardown(&mut p);
        let out = output(&cap, &mut p);
        assert!(out.starts_with("\x1b[r"));
    }

    #[test]
    fn cursor_report_parsing() {
        assert_eq!(parse_cursor_report(b"\x1b[12;40R"), Some(12));
        assert_eq!(parse_cursor_report(b"junk\x1b[3;1R"), Some(3));
        assert_eq!(parse_cursor_report(b"\x1b[12;40"), None);
        assert_eq!(parse_cursor_report(b"no report"), None);
    }

    #[test]
    fn clip_respects_wide_chars() {
        assert_eq!(clip("日本語", 4), "日本");
        assert_eq!(clip("abc", 10), "abc");
    }
}
