pub mod decode;
pub mod pager;
pub mod progress;

use std::io::IsTerminal;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{io_context, Result};
use crate::format::{FormatSink, Formatter, ProtoSchema};
use crate::printer::{Printer, Sequence};
use crate::request::Outcome;
use crate::resolve::{FormatMode, ResolvedRequest};
use decode::Decoder;
use pager::Pager;
use progress::Progress;

/// Render a response: status/header output, streaming decompression,
/// sink selection, and the final exit code.
pub async fn render(
    req: &ResolvedRequest,
    outcome: Outcome,
    stderr: &mut Printer,
    cancel: &CancellationToken,
) -> Result<i32> {
    let Outcome {
        mut response,
        sent_headers,
        deadline,
    } = outcome;

    let status = response.status();

    if !req.silent {
        if req.verbosity >= 1 {
            render_status_line(&response, stderr);
        }
        if req.verbosity >= 2 {
            render_response_headers(&response, stderr);
        }
        if req.verbosity >= 3 {
            stderr.write_str("\n");
            for kv in &sent_headers {
                stderr.set(Sequence::Dim);
                stderr.write_str(&format!("> {}: {}\n", kv.key, kv.value));
                stderr.reset();
            }
        }
        stderr.flush()?;
    }

    let mut decoder = make_decoder(&response, stderr)?;
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok());

    let mut sink = build_sink(req, &response, content_type.as_ref()).await?;

    loop {
        let chunk = deadline
            .run(cancel, async { Ok(response.chunk().await?) })
            .await?;
        let Some(chunk) = chunk else { break };

        let decoded = decoder.write(&chunk)?;
        sink.write(&chunk, &decoded, stderr).await?;
    }
    let tail = decoder.finish()?;
    sink.write(&[], &tail, stderr).await?;
    sink.finish(stderr).await?;

    Ok(exit_code_for_status(status, req.ignore_status))
}

/// Map the final status to the process exit code.
pub fn exit_code_for_status(status: http::StatusCode, ignore_status: bool) -> i32 {
    if ignore_status {
        return 0;
    }
    match status.as_u16() {
        100..=399 if status.is_redirection() => 3,
        400..=499 => 4,
        500..=599 => 5,
        _ => 0,
    }
}

// -- Status and header rendering ----------------------------------------------

fn status_color(status: http::StatusCode) -> Sequence {
    if status.is_success() {
        Sequence::Green
    } else if status.is_redirection() {
        Sequence::Cyan
    } else if status.is_client_error() {
        Sequence::Yellow
    } else if status.is_server_error() {
        Sequence::Red
    } else {
        Sequence::Default
    }
}

fn render_status_line(response: &reqwest::Response, stderr: &mut Printer) {
    let status = response.status();
    stderr.set(Sequence::Dim);
    stderr.write_str(&format!("{:?} ", response.version()));
    stderr.reset();
    stderr.set(status_color(status));
    stderr.set(Sequence::Bold);
    stderr.write_str(status.as_str());
    if let Some(reason) = status.canonical_reason() {
        stderr.write_str(" ");
        stderr.write_str(reason);
    }
    stderr.reset();
    stderr.write_str("\n");
}

fn render_response_headers(response: &reqwest::Response, stderr: &mut Printer) {
    for (name, value) in response.headers() {
        stderr.set(Sequence::Cyan);
        stderr.write_str(name.as_str());
        stderr.reset();
        stderr.write_str(": ");
        stderr.write_str(value.to_str().unwrap_or("<binary>"));
        stderr.write_str("\n");
    }
}

// -- Decoder selection --------------------------------------------------------

fn make_decoder(response: &reqwest::Response, stderr: &mut Printer) -> Result<Decoder> {
    let Some(encoding) = response
        .headers()
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(Decoder::identity());
    };

    match Decoder::for_encoding(encoding)? {
        Some(decoder) => Ok(decoder),
        None => {
            stderr.set(Sequence::Yellow);
            stderr.write_str("warning");
            stderr.reset();
            stderr.write_str(&format!(
                ": unknown content-encoding '{encoding}'; passing body through\n"
            ));
            stderr.flush()?;
            Ok(Decoder::identity())
        }
    }
}

// -- Sinks --------------------------------------------------------------------

enum Sink {
    /// --output PATH: decoded bytes stream to disk with progress.
    File {
        file: tokio::fs::File,
        progress: Progress,
    },
    /// Terminal or pipe: optionally formatted, optionally paged.
    Stream {
        printer: Printer,
        format: Option<FormatSink>,
        pager: Option<Pager>,
    },
}

async fn build_sink(
    req: &ResolvedRequest,
    response: &reqwest::Response,
    content_type: Option<&mime::Mime>,
) -> Result<Sink> {
    if let Some(path) = &req.output {
        if path != Path::new("-") {
            let file = tokio::fs::File::create(path)
                .await
                .map_err(|e| io_context(e, &format!("creating '{}'", path.display())))?;
            let progress = Progress::for_download(response.content_length(), req.silent);
            return Ok(Sink::File { file, progress });
        }
        // `--output -`: raw bytes to stdout regardless of TTY.
        return Ok(Sink::Stream {
            printer: Printer::stdout(req.color),
            format: None,
            pager: None,
        });
    }

    let stdout_tty = std::io::stdout().is_terminal();
    let formatting_on = match req.format {
        FormatMode::On => true,
        FormatMode::Off => false,
        FormatMode::Auto => stdout_tty,
    };

    let proto = ProtoSchema {
        files: req.proto_files.clone(),
        desc: req.proto_desc.clone(),
        message: req.proto_message.clone(),
    };
    let format = if formatting_on && stdout_tty {
        content_type.and_then(|mime| Formatter::for_content_type(mime, &proto))
    } else {
        None
    };

    let texty = content_type.is_some_and(is_texty);
    let pageable = stdout_tty && !req.no_pager && texty && !matches!(format, Some(Formatter::Image));

    if pageable {
        if let Some((pager, stdin)) = Pager::spawn() {
            // The pager inherits stdout's color policy (`less -R` passes
            // SGR through).
            let color = Printer::stdout(req.color).color_enabled();
            return Ok(Sink::Stream {
                printer: Printer::sink(stdin, color),
                format: format.map(FormatSink::new),
                pager: Some(pager),
            });
        }
    }

    Ok(Sink::Stream {
        printer: Printer::stdout(req.color),
        format: format.map(FormatSink::new),
        pager: None,
    })
}

/// Whether a content type is text-shaped for paging purposes.
fn is_texty(mime: &mime::Mime) -> bool {
    if mime.type_() == mime::TEXT {
        return true;
    }
    matches!(
        mime.subtype().as_str(),
        "json" | "x-ndjson" | "ndjson" | "xml" | "yaml" | "x-yaml"
    ) || matches!(mime.suffix().map(|s| s.as_str()), Some("json" | "xml"))
}

impl Sink {
    /// Consume one chunk. `raw` is the wire chunk (for progress), `decoded`
    /// the post-decompression bytes.
    async fn write(&mut self, raw: &[u8], decoded: &[u8], stderr: &mut Printer) -> Result<()> {
        match self {
            Sink::File { file, progress } => {
                file.write_all(decoded)
                    .await
                    .map_err(|e| io_context(e, "writing output file"))?;
                progress.inc(raw.len() as u64);
                Ok(())
            }
            Sink::Stream {
                printer, format, ..
            } => {
                if decoded.is_empty() {
                    return Ok(());
                }
                match format {
                    Some(sink) => {
                        sink.feed(decoded, printer)?;
                        if let Some(warning) = sink.take_warning() {
                            render_warning(&warning, stderr)?;
                        }
                        if sink.streaming() {
                            printer.flush()?;
                        }
                    }
                    None => {
                        printer.write_bytes(decoded);
                        printer.flush()?;
                    }
                }
                Ok(())
            }
        }
    }

    async fn finish(self, stderr: &mut Printer) -> Result<()> {
        match self {
            Sink::File { mut file, progress } => {
                file.flush()
                    .await
                    .map_err(|e| io_context(e, "flushing output file"))?;
                progress.finish();
                Ok(())
            }
            Sink::Stream {
                mut printer,
                format,
                pager,
            } => {
                if let Some(mut sink) = format {
                    sink.finish(&mut printer)?;
                    if let Some(warning) = sink.take_warning() {
                        render_warning(&warning, stderr)?;
                    }
                }
                printer.flush()?;
                // Dropping the printer closes the pager's stdin; then wait
                // for the user to quit it.
                drop(printer);
                if let Some(pager) = pager {
                    pager.wait().await;
                }
                Ok(())
            }
        }
    }
}

fn render_warning(warning: &str, stderr: &mut Printer) -> Result<()> {
    stderr.set(Sequence::Yellow);
    stderr.write_str("warning");
    stderr.reset();
    stderr.write_str(": ");
    stderr.write_str(warning);
    stderr.write_str("\n");
    stderr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_class() {
        let code = |n: u16| exit_code_for_status(http::StatusCode::from_u16(n).unwrap(), false);
        assert_eq!(code(200), 0);
        assert_eq!(code(204), 0);
        assert_eq!(code(301), 3);
        assert_eq!(code(404), 4);
        assert_eq!(code(500), 5);
        assert_eq!(code(101), 0);
    }

    #[test]
    fn ignore_status_forces_zero() {
        let code = |n: u16| exit_code_for_status(http::StatusCode::from_u16(n).unwrap(), true);
        assert_eq!(code(404), 0);
        assert_eq!(code(500), 0);
        assert_eq!(code(200), 0);
    }

    #[test]
    fn texty_types() {
        let texty = |s: &str| is_texty(&s.parse().unwrap());
        assert!(texty("text/plain"));
        assert!(texty("text/html; charset=utf-8"));
        assert!(texty("application/json"));
        assert!(texty("application/hal+json"));
        assert!(texty("application/xml"));
        assert!(!texty("application/octet-stream"));
        assert!(!texty("image/png"));
    }

    #[test]
    fn status_colors_by_class() {
        assert_eq!(status_color(http::StatusCode::OK), Sequence::Green);
        assert_eq!(
            status_color(http::StatusCode::MOVED_PERMANENTLY),
            Sequence::Cyan
        );
        assert_eq!(status_color(http::StatusCode::NOT_FOUND), Sequence::Yellow);
        assert_eq!(
            status_color(http::StatusCode::INTERNAL_SERVER_ERROR),
            Sequence::Red
        );
    }
}
