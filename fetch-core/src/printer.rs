use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::str::FromStr;

/// When to emit ANSI color escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Auto,
    Off,
    On,
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ColorMode::Auto),
            "off" => Ok(ColorMode::Off),
            "on" => Ok(ColorMode::On),
            other => Err(format!(
                "The --color option must be 'auto', 'off', or 'on', got '{other}'."
            )),
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorMode::Auto => write!(f, "auto"),
            ColorMode::Off => write!(f, "off"),
            ColorMode::On => write!(f, "on"),
        }
    }
}

/// SGR sequences the renderers are allowed to emit.
///
/// The set is closed: four styles, the eight standard foregrounds, and the
/// terminal default foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Bold,
    Dim,
    Italic,
    Underline,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    Default,
}

impl Sequence {
    fn ansi(self) -> &'static [u8] {
        match self {
            Sequence::Bold => b"\x1b[1m",
            Sequence::Dim => b"\x1b[2m",
            Sequence::Italic => b"\x1b[3m",
            Sequence::Underline => b"\x1b[4m",
            Sequence::Black => b"\x1b[30m",
            Sequence::Red => b"\x1b[31m",
            Sequence::Green => b"\x1b[32m",
            Sequence::Yellow => b"\x1b[33m",
            Sequence::Blue => b"\x1b[34m",
            Sequence::Magenta => b"\x1b[35m",
            Sequence::Cyan => b"\x1b[36m",
            Sequence::White => b"\x1b[37m",
            Sequence::Default => b"\x1b[39m",
        }
    }
}

const RESET: &[u8] = b"\x1b[0m";

enum Target {
    Stdout,
    Stderr,
    /// An arbitrary sink, e.g. a pager's stdin or a test buffer.
    Sink(Box<dyn Write + Send>),
}

/// A buffered, ANSI-aware writer.
///
/// Every `set` must be paired with a `reset` before the surrounding output
/// is flushed; the renderers in this crate uphold that on all paths,
/// including error paths.
///
/// Output is buffered until `flush`. A partial flush (the underlying write
/// failing midway) drops only the bytes already written, so a retry does not
/// duplicate output.
pub struct Printer {
    buf: Vec<u8>,
    target: Target,
    color: bool,
    tty: bool,
}

impl Printer {
    pub fn stdout(mode: ColorMode) -> Printer {
        let tty = io::stdout().is_terminal();
        Printer {
            buf: Vec::with_capacity(4096),
            target: Target::Stdout,
            color: resolve_color(mode, tty),
            tty,
        }
    }

    pub fn stderr(mode: ColorMode) -> Printer {
        let tty = io::stderr().is_terminal();
        Printer {
            buf: Vec::with_capacity(1024),
            target: Target::Stderr,
            color: resolve_color(mode, tty),
            tty,
        }
    }

    /// A printer over an arbitrary sink. Color is decided by the caller,
    /// since a sink (pager pipe, capture buffer) has no TTY of its own.
    pub fn sink(sink: Box<dyn Write + Send>, color: bool) -> Printer {
        Printer {
            buf: Vec::with_capacity(4096),
            target: Target::Sink(sink),
            color,
            tty: false,
        }
    }

    /// Whether the underlying descriptor is a terminal.
    pub fn is_tty(&self) -> bool {
        self.tty
    }

    /// Whether SGR escapes are being emitted.
    pub fn color_enabled(&self) -> bool {
        self.color
    }

    /// Begin a styled span. No-op when color is off.
    pub fn set(&mut self, seq: Sequence) {
        if self.color {
            self.buf.extend_from_slice(seq.ansi());
        }
    }

    /// End all styled spans. No-op when color is off.
    pub fn reset(&mut self) {
        if self.color {
            self.buf.extend_from_slice(RESET);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Drop buffered output that has not been flushed yet.
    ///
    /// Used when a formatter fails partway: its styled prefix is thrown
    /// away and the raw bytes are written instead.
    pub fn discard(&mut self) {
        self.buf.clear();
    }

    /// Flush buffered output to the underlying stream.
    ///
    /// Idempotent when the buffer is empty. On error, the unwritten suffix
    /// remains buffered.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut written = 0;
        let result = match &mut self.target {
            Target::Stdout => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                write_all_counted(&mut lock, &self.buf, &mut written).and_then(|()| lock.flush())
            }
            Target::Stderr => {
                let stderr = io::stderr();
                let mut lock = stderr.lock();
                write_all_counted(&mut lock, &self.buf, &mut written).and_then(|()| lock.flush())
            }
            Target::Sink(sink) => {
                write_all_counted(sink, &self.buf, &mut written).and_then(|()| sink.flush())
            }
        };
        self.buf.drain(..written);
        result
    }
}

fn write_all_counted(w: &mut impl Write, buf: &[u8], written: &mut usize) -> io::Result<()> {
    while *written < buf.len() {
        match w.write(&buf[*written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write buffered output",
                ));
            }
            Ok(n) => *written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl Write for Printer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Printer::flush(self)
    }
}

/// Resolve the tri-state mode against the TTY bit and NO_COLOR.
fn resolve_color(mode: ColorMode, tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        return false;
    }
    match mode {
        ColorMode::On => true,
        ColorMode::Off => false,
        ColorMode::Auto => tty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_printer(color: bool) -> (Printer, Capture) {
        let cap = Capture::default();
        let p = Printer::sink(Box::new(cap.clone()), color);
        (p, cap)
    }

    #[test]
    fn color_off_emits_no_escapes() {
        let (mut p, cap) = capture_printer(false);
        p.set(Sequence::Red);
        p.write_str("hello");
        p.reset();
        p.flush().unwrap();
        let out = cap.0.lock().unwrap().clone();
        assert_eq!(out, b"hello");
        assert!(!out.contains(&0x1b));
    }

    #[test]
    fn color_on_pairs_set_with_reset() {
        let (mut p, cap) = capture_printer(true);
        p.set(Sequence::Cyan);
        p.write_str("key");
        p.reset();
        p.flush().unwrap();
        let out = cap.0.lock().unwrap().clone();
        assert_eq!(out, b"\x1b[36mkey\x1b[0m");
    }

    #[test]
    fn flush_is_idempotent() {
        let (mut p, cap) = capture_printer(false);
        p.write_str("once");
        p.flush().unwrap();
        p.flush().unwrap();
        assert_eq!(cap.0.lock().unwrap().as_slice(), b"once");
    }

    #[test]
    fn partial_flush_keeps_remaining_buffer() {
        struct FailAfter {
            n: usize,
            cap: Capture,
        }
        impl Write for FailAfter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                if self.n == 0 {
                    return Err(io::Error::new(io::ErrorKind::Other, "full"));
                }
                let take = buf.len().min(self.n);
                self.n -= take;
                self.cap.write(&buf[..take])
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let cap = Capture::default();
        let mut p = Printer::sink(
            Box::new(FailAfter {
                n: 3,
                cap: cap.clone(),
            }),
            false,
        );
        p.write_str("abcdef");
        assert!(p.flush().is_err());
        // The first three bytes were written and must not be replayed.
        assert_eq!(cap.0.lock().unwrap().as_slice(), b"abc");
        assert_eq!(p.buf, b"def");
    }

    #[test]
    fn color_mode_parses() {
        assert_eq!("auto".parse::<ColorMode>().unwrap(), ColorMode::Auto);
        assert_eq!("off".parse::<ColorMode>().unwrap(), ColorMode::Off);
        assert_eq!("on".parse::<ColorMode>().unwrap(), ColorMode::On);
        assert!("yes".parse::<ColorMode>().is_err());
    }
}
