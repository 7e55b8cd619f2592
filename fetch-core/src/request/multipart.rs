use std::io;
use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::resolve::{MultipartField, MultipartValue};

/// Channel depth between the part producer and the HTTP body reader. The
/// reader consuming at its own rate provides backpressure.
const PIPE_DEPTH: usize = 8;

/// File read chunk size.
const CHUNK: usize = 64 * 1024;

/// A streaming multipart/form-data body.
///
/// The producer task writes part headers and file contents into a bounded
/// byte pipe; the consumer half is handed to the HTTP client. A file error
/// closes the pipe with that error, which aborts the request.
pub struct MultipartBody {
    pub boundary: String,
    pub stream: ReceiverStream<io::Result<Bytes>>,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Spawn the producer for the given fields and return the consumer half.
pub fn stream(fields: Vec<MultipartField>) -> MultipartBody {
    let boundary = make_boundary();
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(PIPE_DEPTH);

    let producer_boundary = boundary.clone();
    tokio::spawn(async move {
        if let Err(err) = produce(&producer_boundary, fields, &tx).await {
            // Propagate by closing the pipe with the error; a receiver that
            // has gone away already aborted the request.
            let _ = tx.send(Err(err)).await;
        }
    });

    MultipartBody {
        boundary,
        stream: ReceiverStream::new(rx),
    }
}

async fn produce(
    boundary: &str,
    fields: Vec<MultipartField>,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) -> io::Result<()> {
    for field in fields {
        let mut head = format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"", escape_name(&field.name));
        match &field.value {
            MultipartValue::Text(_) => head.push_str("\r\n\r\n"),
            MultipartValue::File(path) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mime = mime_guess::from_path(path).first_or_octet_stream();
                head.push_str(&format!(
                    "; filename=\"{}\"\r\nContent-Type: {mime}\r\n\r\n",
                    escape_name(&filename)
                ));
            }
        }
        send(tx, Bytes::from(head)).await?;

        match field.value {
            MultipartValue::Text(text) => send(tx, Bytes::from(text)).await?,
            MultipartValue::File(path) => stream_file(&path, tx).await?,
        }
        send(tx, Bytes::from_static(b"\r\n")).await?;
    }
    send(tx, Bytes::from(format!("--{boundary}--\r\n"))).await?;
    Ok(())
}

/// Stream one file into the pipe. The handle is closed (dropped) as soon
/// as its part is fully written.
async fn stream_file(path: &Path, tx: &mpsc::Sender<io::Result<Bytes>>) -> io::Result<()> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        io::Error::new(e.kind(), format!("opening '{}': {e}", path.display()))
    })?;
    if meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' is a directory", path.display()),
        ));
    }
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        io::Error::new(e.kind(), format!("opening '{}': {e}", path.display()))
    })?;
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        send(tx, Bytes::copy_from_slice(&buf[..n])).await?;
    }
    Ok(())
}

async fn send(tx: &mpsc::Sender<io::Result<Bytes>>, bytes: Bytes) -> io::Result<()> {
    tx.send(Ok(bytes))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "request body reader went away"))
}

/// Quote-escape a field or file name for a Content-Disposition header.
fn escape_name(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A boundary unique to this invocation.
fn make_boundary() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("fetch-{:032x}", nanos ^ u128::from(std::process::id()) << 64)
}
