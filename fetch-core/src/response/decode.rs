use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// A shared output buffer handed to the write-side decompressors, drained
/// after every push.
#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Vec<u8>>>);

impl Shared {
    fn drain(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.lock().expect("decoder sink lock"))
    }
}

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("decoder sink lock").extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

enum Kind {
    Identity,
    Gzip(flate2::write::GzDecoder<Shared>),
    Deflate(flate2::write::ZlibDecoder<Shared>),
    Brotli(Box<brotli::DecompressorWriter<Shared>>),
    Zstd(zstd::stream::write::Decoder<'static, Shared>),
}

/// Streaming content decoder: push encoded bytes in, pull decoded bytes
/// out, in stream order.
pub struct Decoder {
    kind: Kind,
    out: Shared,
}

impl Decoder {
    pub fn identity() -> Decoder {
        Decoder {
            kind: Kind::Identity,
            out: Shared::default(),
        }
    }

    /// Build a decoder for a Content-Encoding token. `Ok(None)` means the
    /// encoding is not recognized and the body should pass through.
    pub fn for_encoding(encoding: &str) -> Result<Option<Decoder>> {
        let out = Shared::default();
        let kind = match encoding.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Kind::Identity,
            "gzip" | "x-gzip" => Kind::Gzip(flate2::write::GzDecoder::new(out.clone())),
            "deflate" => Kind::Deflate(flate2::write::ZlibDecoder::new(out.clone())),
            "br" => Kind::Brotli(Box::new(brotli::DecompressorWriter::new(out.clone(), 4096))),
            "zstd" => Kind::Zstd(
                zstd::stream::write::Decoder::new(out.clone()).map_err(decode_err("zstd"))?,
            ),
            _ => return Ok(None),
        };
        Ok(Some(Decoder { kind, out }))
    }

    /// Push one encoded chunk; returns the decoded bytes it produced.
    pub fn write(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        match &mut self.kind {
            Kind::Identity => return Ok(chunk.to_vec()),
            Kind::Gzip(w) => w.write_all(chunk).map_err(decode_err("gzip"))?,
            Kind::Deflate(w) => w.write_all(chunk).map_err(decode_err("deflate"))?,
            Kind::Brotli(w) => w.write_all(chunk).map_err(decode_err("brotli"))?,
            Kind::Zstd(w) => w.write_all(chunk).map_err(decode_err("zstd"))?,
        }
        Ok(self.out.drain())
    }

    /// Signal end of input; returns any final decoded bytes.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        match &mut self.kind {
            Kind::Identity => {}
            Kind::Gzip(w) => w.try_finish().map_err(decode_err("gzip"))?,
            Kind::Deflate(w) => w.try_finish().map_err(decode_err("deflate"))?,
            Kind::Brotli(w) => {
                w.flush().map_err(decode_err("brotli"))?;
            }
            Kind::Zstd(w) => w.flush().map_err(decode_err("zstd"))?,
        }
        Ok(self.out.drain())
    }
}

fn decode_err(codec: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |e| Error::Network(format!("{codec} decoding failed: {e}"))
}
