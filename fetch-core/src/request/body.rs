use std::io::Write as _;
use std::path::Path;
use std::process::Command;

use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::error::{io_context, Error, Result};
use crate::request::multipart;
use crate::resolve::{BodySource, KeyVal, ResolvedRequest};

/// A body prepared for one request attempt.
///
/// Streaming sources are re-opened per attempt so retries and re-signing see
/// a fresh stream; in-memory sources also expose their bytes for eager
/// digests.
#[derive(Debug)]
pub struct PreparedBody {
    pub body: Option<reqwest::Body>,
    /// Content-Type to synthesize, unless the user set one explicitly.
    pub content_type: Option<String>,
    /// The full payload, when it is available in memory.
    pub bytes: Option<Vec<u8>>,
}

impl PreparedBody {
    fn empty() -> PreparedBody {
        PreparedBody {
            body: None,
            content_type: None,
            bytes: None,
        }
    }
}

/// Materialize the request body for one attempt.
///
/// `stdin_cache` holds stdin after it has been drained once, so retries can
/// replay it; the first call fills it.
pub async fn prepare(
    req: &ResolvedRequest,
    stdin_cache: &mut Option<Vec<u8>>,
) -> Result<PreparedBody> {
    let forced = forced_content_type(req);

    match &req.body {
        BodySource::None => Ok(PreparedBody::empty()),

        BodySource::Bytes(bytes) => Ok(PreparedBody {
            body: Some(bytes.clone().into()),
            content_type: forced.or(Some("text/plain".to_string())),
            bytes: Some(bytes.clone()),
        }),

        BodySource::File(path) => {
            let meta = tokio::fs::metadata(path)
                .await
                .map_err(|e| io_context(e, &format!("opening '{}'", path.display())))?;
            if meta.is_dir() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("'{}' is a directory", path.display()),
                )));
            }
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| io_context(e, &format!("opening '{}'", path.display())))?;
            let content_type = forced.or_else(|| guess_content_type(path));
            Ok(PreparedBody {
                body: Some(reqwest::Body::wrap_stream(ReaderStream::new(file))),
                content_type,
                bytes: None,
            })
        }

        BodySource::Stdin => {
            // Stdin is drained once and buffered so retries and signing can
            // see the whole payload.
            if stdin_cache.is_none() {
                let mut buf = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| io_context(e, "reading stdin"))?;
                *stdin_cache = Some(buf);
            }
            let bytes = stdin_cache.clone().expect("stdin cached above");
            Ok(PreparedBody {
                body: Some(bytes.clone().into()),
                content_type: forced,
                bytes: Some(bytes),
            })
        }

        BodySource::Form(fields) => {
            let encoded = encode_form(fields);
            Ok(PreparedBody {
                body: Some(encoded.clone().into_bytes().into()),
                content_type: Some("application/x-www-form-urlencoded".to_string()),
                bytes: Some(encoded.into_bytes()),
            })
        }

        BodySource::Multipart(fields) => {
            let multipart = multipart::stream(fields.clone());
            let content_type = multipart.content_type();
            Ok(PreparedBody {
                body: Some(reqwest::Body::wrap_stream(multipart.stream)),
                content_type: Some(content_type),
                bytes: None,
            })
        }

        BodySource::Edit => {
            // A dry run must not open the editor; the body stays empty.
            let bytes = if req.dry_run {
                Vec::new()
            } else {
                capture_from_editor(req.force_xml)?
            };
            Ok(PreparedBody {
                body: Some(bytes.clone().into()),
                content_type: forced,
                bytes: Some(bytes),
            })
        }
    }
}

/// The content type forced by --json / --xml, if either is set.
fn forced_content_type(req: &ResolvedRequest) -> Option<String> {
    if req.force_json {
        Some("application/json".to_string())
    } else if req.force_xml {
        Some("application/xml".to_string())
    } else {
        None
    }
}

/// Canonical application/x-www-form-urlencoded encoding, field order
/// preserved.
pub fn encode_form(fields: &[KeyVal]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for field in fields {
        serializer.append_pair(&field.key, &field.value);
    }
    serializer.finish()
}

fn guess_content_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.to_string())
}

/// Open $EDITOR (falling back to $VISUAL, then vi) on a seeded tempfile and
/// return the final contents.
fn capture_from_editor(xml: bool) -> Result<Vec<u8>> {
    let (suffix, seed) = if xml {
        (".xml", "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root>\n</root>\n")
    } else {
        (".json", "{\n  \n}\n")
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("fetch-body-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| io_context(e, "creating editor tempfile"))?;
    tmp.write_all(seed.as_bytes())
        .map_err(|e| io_context(e, "seeding editor tempfile"))?;
    tmp.flush().map_err(|e| io_context(e, "seeding editor tempfile"))?;

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());

    let status = Command::new(&editor)
        .arg(tmp.path())
        .status()
        .map_err(|e| io_context(e, &format!("launching editor '{editor}'")))?;
    if !status.success() {
        return Err(Error::Cli(format!(
            "editor '{editor}' exited with {status}; request aborted"
        )));
    }

    std::fs::read(tmp.path()).map_err(|e| io_context(e, "reading edited body").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{self, RawFlags};

    fn resolved(f: impl FnOnce(&mut RawFlags)) -> ResolvedRequest {
        let mut raw = RawFlags::default();
        raw.url = Some("example.com".into());
        f(&mut raw);
        resolve::resolve(raw).unwrap()
    }

    #[tokio::test]
    async fn literal_data_defaults_to_text_plain() {
        let req = resolved(|raw| raw.data = Some("hello".into()));
        let body = prepare(&req, &mut None).await.unwrap();
        assert_eq!(body.content_type.as_deref(), Some("text/plain"));
        assert_eq!(body.bytes.as_deref(), Some(b"hello".as_slice()));
    }

    #[tokio::test]
    async fn json_flag_forces_content_type() {
        let req = resolved(|raw| {
            raw.data = Some(r#"{"a":1}"#.into());
            raw.json = true;
        });
        let body = prepare(&req, &mut None).await.unwrap();
        assert_eq!(body.content_type.as_deref(), Some("application/json"));
        assert_eq!(body.bytes.as_deref(), Some(br#"{"a":1}"#.as_slice()));
    }

    #[tokio::test]
    async fn form_body_is_canonical_encoding() {
        let req = resolved(|raw| raw.form = vec!["a=1".into(), "b=two words".into()]);
        let body = prepare(&req, &mut None).await.unwrap();
        assert_eq!(
            body.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(body.bytes.as_deref(), Some(b"a=1&b=two+words".as_slice()));
    }

    #[tokio::test]
    async fn file_content_type_guessed_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, b"{}").unwrap();

        let req = resolved(|raw| raw.data = Some(format!("@{}", path.display())));
        let body = prepare(&req, &mut None).await.unwrap();
        assert_eq!(body.content_type.as_deref(), Some("application/json"));
        assert!(body.bytes.is_none(), "file bodies stream");
    }

    #[tokio::test]
    async fn data_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let req = resolved(|raw| raw.data = Some(format!("@{}", dir.path().display())));
        let err = prepare(&req, &mut None).await.unwrap_err();
        assert!(err.to_string().contains("is a directory"), "got: {err}");
    }

    #[test]
    fn form_encoding_preserves_order() {
        let fields = vec![
            KeyVal::new("z", "1"),
            KeyVal::new("a", "2"),
            KeyVal::new("m", "a&b"),
        ];
        assert_eq!(encode_form(&fields), "z=1&a=2&m=a%26b");
    }
}
