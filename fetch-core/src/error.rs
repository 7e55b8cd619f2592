use std::fmt;
use std::io;
use std::time::Duration;

use crate::printer::{Printer, Sequence};

/// All error kinds produced by the fetch library.
///
/// Each kind carries the payload needed for its rendering; `render` produces
/// the uniform user-facing form, while `Display` stays a plain message so
/// errors compose when wrapped.
#[derive(Debug)]
pub enum Error {
    /// Bad command-line input: unknown flag, missing argument, exclusive
    /// flags, unmet requirement, enum or value format violation.
    Cli(String),

    /// Config file syntax error or unknown key.
    Config(String),

    /// An I/O error (file read/write, pipe, spawn).
    Io(io::Error),

    /// A transport-level failure: connect, DNS, TLS, or protocol.
    Network(String),

    /// The overall request deadline expired.
    Timeout(Duration),

    /// The operation was interrupted by a signal.
    Signal(&'static str),

    /// Self-update failure: missing artifact, unpack, or replace.
    Update(String),

    /// Malformed input for the selected formatter. Never fatal to the
    /// request: the pipeline warns and falls back to raw output.
    Format(String),
}

impl Error {
    /// Render the error to a printer with the uniform `error:` prefix.
    ///
    /// Kept separate from `Display` so the rendering can colorize without
    /// the message form carrying escapes.
    pub fn render(&self, p: &mut Printer) {
        p.set(Sequence::Red);
        p.set(Sequence::Bold);
        p.write_str("error");
        p.reset();
        p.write_str(": ");
        p.write_str(&self.to_string());
        p.write_str("\n");
    }

    /// Exit code for a failed invocation. HTTP status classes are mapped by
    /// the response pipeline; every error kind here is a hard failure.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Cli(msg) => write!(f, "{msg}"),
            Error::Config(msg) => write!(f, "config: {msg}"),
            Error::Io(err) => write!(f, "{err}"),
            Error::Network(msg) => write!(f, "{msg}"),
            Error::Timeout(elapsed) => {
                write!(f, "request timed out after {}", format_secs(*elapsed))
            }
            Error::Signal(name) => write!(f, "interrupted by {name}"),
            Error::Update(msg) => write!(f, "update: {msg}"),
            Error::Format(msg) => write!(f, "format: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Error::Network(format!("failed to connect: {err}"))
        } else if err.is_timeout() {
            // The builder enforces its own deadline and reports elapsed time;
            // a timeout surfacing from the client itself is the connect phase.
            Error::Network(format!("connection timed out: {err}"))
        } else if err.is_request() || err.is_body() || err.is_decode() {
            Error::Network(format!("request failed: {err}"))
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Cli(format!("invalid URL: {err}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Network(format!("websocket: {err}"))
    }
}

/// Convenience type alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

/// Format a duration as seconds, with one decimal only when sub-second
/// precision matters: "30s", "2.5s".
fn format_secs(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if (secs - secs.round()).abs() < 0.05 {
        format!("{}s", secs.round() as u64)
    } else {
        format!("{secs:.1}s")
    }
}

/// Attach a path to an I/O error, preserving the kind.
pub fn io_context(err: io::Error, what: &str) -> Error {
    Error::Io(io::Error::new(err.kind(), format!("{what}: {err}")))
}
