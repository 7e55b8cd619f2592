pub mod binary;
pub mod image;
pub mod json;
pub mod lines;
pub mod markup;
pub mod text;

use crate::error::{Error, Result};
use crate::printer::Printer;

pub use binary::ProtoSchema;

/// The closed set of response formatters, resolved by content type.
///
/// Streaming variants colorize as bytes arrive; buffered variants need the
/// whole payload before they can decode.
pub enum Formatter {
    Json(json::JsonFormatter),
    Ndjson(lines::NdjsonFormatter),
    Sse(lines::SseFormatter),
    /// XML and HTML share the markup scanner.
    Markup(markup::MarkupFormatter),
    Css(markup::CssFormatter),
    Yaml(text::YamlFormatter),
    Csv(text::CsvFormatter),
    Msgpack,
    Protobuf(ProtoSchema),
    Image,
}

impl Formatter {
    /// Pick a formatter for a content type. `None` means raw output.
    pub fn for_content_type(mime: &mime::Mime, proto: &ProtoSchema) -> Option<Formatter> {
        let subtype = mime.subtype().as_str();
        let suffix = mime.suffix().map(|s| s.as_str());

        if mime.type_() == mime::IMAGE {
            return matches!(subtype, "png" | "jpeg" | "webp" | "tiff")
                .then_some(Formatter::Image);
        }

        match (mime.type_().as_str(), subtype, suffix) {
            (_, "json", _) | (_, _, Some("json")) => {
                Some(Formatter::Json(json::JsonFormatter::new()))
            }
            (_, "x-ndjson" | "ndjson" | "jsonlines" | "x-jsonlines", _) => {
                Some(Formatter::Ndjson(lines::NdjsonFormatter::new()))
            }
            ("text", "event-stream", _) => Some(Formatter::Sse(lines::SseFormatter::new())),
            (_, "xml", _) | (_, _, Some("xml")) | ("text", "html", _) => {
                Some(Formatter::Markup(markup::MarkupFormatter::new()))
            }
            ("text", "css", _) => Some(Formatter::Css(markup::CssFormatter::new())),
            (_, "yaml" | "x-yaml", _) | (_, _, Some("yaml")) => {
                Some(Formatter::Yaml(text::YamlFormatter::new()))
            }
            ("text", "csv", _) => Some(Formatter::Csv(text::CsvFormatter::new())),
            (_, "msgpack" | "x-msgpack" | "vnd.msgpack", _) => Some(Formatter::Msgpack),
            (_, "protobuf" | "x-protobuf" | "vnd.google.protobuf", _) => {
                Some(Formatter::Protobuf(proto.clone()))
            }
            _ => None,
        }
    }

    /// Whether output can be flushed after every feed. Fallible formatters
    /// hold their output until `finish` so a decode error can fall back to
    /// raw bytes without leaving a styled prefix behind.
    fn streaming(&self) -> bool {
        matches!(
            self,
            Formatter::Ndjson(_)
                | Formatter::Sse(_)
                | Formatter::Markup(_)
                | Formatter::Css(_)
                | Formatter::Yaml(_)
                | Formatter::Csv(_)
        )
    }
}

/// A formatter plus its raw-fallback policy.
///
/// Contract: no input byte is ever silently dropped. When the formatter
/// rejects its input, the sink discards the pending styled output, records
/// a warning, and replays the raw bytes.
pub struct FormatSink {
    formatter: Formatter,
    /// Raw copy of the input, kept while fallback is still possible.
    raw: Vec<u8>,
    failed: bool,
    warning: Option<String>,
}

impl FormatSink {
    pub fn new(formatter: Formatter) -> FormatSink {
        FormatSink {
            formatter,
            raw: Vec::new(),
            failed: false,
            warning: None,
        }
    }

    /// Whether the printer should be flushed after each feed.
    pub fn streaming(&self) -> bool {
        self.formatter.streaming()
    }

    /// A warning produced by a fallback, to be rendered on stderr.
    pub fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }

    pub fn feed(&mut self, chunk: &[u8], p: &mut Printer) -> Result<()> {
        if self.failed {
            p.write_bytes(chunk);
            return Ok(());
        }
        let result = match &mut self.formatter {
            Formatter::Json(f) => {
                self.raw.extend_from_slice(chunk);
                f.feed(chunk, p)
            }
            Formatter::Ndjson(f) => f.feed(chunk, p),
            Formatter::Sse(f) => f.feed(chunk, p),
            Formatter::Markup(f) => f.feed(chunk, p),
            Formatter::Css(f) => f.feed(chunk, p),
            Formatter::Yaml(f) => f.feed(chunk, p),
            Formatter::Csv(f) => f.feed(chunk, p),
            Formatter::Msgpack | Formatter::Protobuf(_) | Formatter::Image => {
                self.raw.extend_from_slice(chunk);
                Ok(())
            }
        };
        if let Err(err) = result {
            self.fall_back(err, p);
        }
        Ok(())
    }

    pub fn finish(&mut self, p: &mut Printer) -> Result<()> {
        if self.failed {
            return Ok(());
        }
        let result = match &mut self.formatter {
            Formatter::Json(f) => f.finish(p),
            Formatter::Ndjson(f) => f.finish(p),
            Formatter::Sse(f) => f.finish(p),
            Formatter::Markup(f) => f.finish(p),
            Formatter::Css(f) => f.finish(p),
            Formatter::Yaml(f) => f.finish(p),
            Formatter::Csv(f) => f.finish(p),
            Formatter::Msgpack => binary::format_msgpack(&self.raw, p),
            Formatter::Protobuf(schema) => {
                let schema = schema.clone();
                binary::format_protobuf(&self.raw, &schema, p)
            }
            Formatter::Image => image::render(&self.raw, p),
        };
        match result {
            Ok(()) => {
                self.raw.clear();
                Ok(())
            }
            Err(err) => {
                self.fall_back(err, p);
                Ok(())
            }
        }
    }

    /// Switch to raw passthrough: drop pending styled output, replay the
    /// raw copy, and record the warning.
    fn fall_back(&mut self, err: Error, p: &mut Printer) {
        p.discard();
        p.write_bytes(&self.raw);
        self.raw = Vec::new();
        self.failed = true;
        self.warning = Some(format!("{err}; writing raw output"));
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

    fn pick(ct: &str) -> Option<Formatter> {
        let mime: mime::Mime = ct.parse().unwrap();
        Formatter::for_content_type(&mime, &ProtoSchema::default())
    }

    #[test]
    fn dispatch_table() {
        assert!(matches!(pick("application/json"), Some(Formatter::Json(_))));
        assert!(matches!(
            pick("application/hal+json; charset=utf-8"),
            Some(Formatter::Json(_))
        ));
        assert!(matches!(pick("application/x-ndjson"), Some(Formatter::Ndjson(_))));
        assert!(matches!(pick("text/event-stream"), Some(Formatter::Sse(_))));
        assert!(matches!(pick("application/xml"), Some(Formatter::Markup(_))));
        assert!(matches!(pick("image/svg+xml"), None), "svg is not decodable");
        assert!(matches!(pick("text/html"), Some(Formatter::Markup(_))));
        assert!(matches!(pick("text/css"), Some(Formatter::Css(_))));
        assert!(matches!(pick("application/yaml"), Some(Formatter::Yaml(_))));
        assert!(matches!(pick("text/csv"), Some(Formatter::Csv(_))));
        assert!(matches!(pick("application/msgpack"), Some(Formatter::Msgpack)));
        assert!(matches!(
            pick("application/x-protobuf"),
            Some(Formatter::Protobuf(_))
        ));
        assert!(matches!(pick("image/png"), Some(Formatter::Image)));
        assert!(pick("application/octet-stream").is_none());
        assert!(pick("text/plain").is_none());
    }

    #[test]
    fn json_sink_formats_good_input() {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), false);
        let mut sink = FormatSink::new(pick("application/json").unwrap());
        sink.feed(br#"{"a":1}"#, &mut p).unwrap();
        sink.finish(&mut p).unwrap();
        p.flush().unwrap();
        assert!(sink.take_warning().is_none());
        let out = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out, "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn json_sink_falls_back_to_raw_without_loss() {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), true);
        let mut sink = FormatSink::new(pick("application/json").unwrap());
        sink.feed(b"{\"a\": oops", &mut p).unwrap();
        sink.feed(b" more bytes", &mut p).unwrap();
        sink.finish(&mut p).unwrap();
        p.flush().unwrap();

        let warning = sink.take_warning().expect("fallback warns");
        assert!(warning.contains("raw"), "got: {warning}");
        let out = cap.0.lock().unwrap().clone();
        // Every input byte present, and no stale escapes from the styled
        // prefix that was discarded.
        assert_eq!(out, b"{\"a\": oops more bytes");
    }

    #[test]
    fn image_sink_falls_back_on_garbage() {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), false);
        let mut sink = FormatSink::new(pick("image/png").unwrap());
        sink.feed(b"definitely not a png", &mut p).unwrap();
        sink.finish(&mut p).unwrap();
        p.flush().unwrap();
        assert!(sink.take_warning().is_some());
        assert_eq!(cap.0.lock().unwrap().as_slice(), b"definitely not a png");
    }

    #[test]
    fn streaming_classification() {
        assert!(!FormatSink::new(pick("application/json").unwrap()).streaming());
        assert!(FormatSink::new(pick("text/event-stream").unwrap()).streaming());
        assert!(!FormatSink::new(pick("image/png").unwrap()).streaming());
    }
}
