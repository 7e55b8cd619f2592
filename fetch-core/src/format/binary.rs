use std::path::{Path, PathBuf};

use base64::Engine as _;
use prost_reflect::{DescriptorPool, DynamicMessage, SerializeOptions};

use crate::error::{Error, Result};
use crate::format::json::JsonFormatter;
use crate::printer::Printer;

/// Protobuf schema inputs: compiled `.proto` sources or an encoded
/// FileDescriptorSet, plus the fully-qualified message name to decode.
#[derive(Debug, Clone, Default)]
pub struct ProtoSchema {
    pub files: Vec<PathBuf>,
    pub desc: Option<PathBuf>,
    pub message: Option<String>,
}

impl ProtoSchema {
    pub fn is_configured(&self) -> bool {
        !self.files.is_empty() || self.desc.is_some()
    }
}

/// Decode a msgpack payload (one or more concatenated values) into a
/// JSON-like intermediate and run it through the JSON formatter.
///
/// Binary payloads become base64 strings; non-string map keys are
/// stringified.
pub fn format_msgpack(bytes: &[u8], p: &mut Printer) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    let mut cursor = bytes;
    while !cursor.is_empty() {
        let value = rmpv::decode::read_value(&mut cursor)
            .map_err(|e| Error::Format(format!("invalid msgpack payload: {e}")))?;
        let json = msgpack_to_json(&value);
        let text = serde_json::to_string(&json)
            .map_err(|e| Error::Format(format!("encoding msgpack intermediate: {e}")))?;
        let mut f = JsonFormatter::new();
        f.feed(text.as_bytes(), p)?;
        f.finish(p)?;
    }
    Ok(())
}

fn msgpack_to_json(value: &rmpv::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        rmpv::Value::Nil => Json::Null,
        rmpv::Value::Boolean(b) => Json::Bool(*b),
        rmpv::Value::Integer(i) => {
            if let Some(n) = i.as_i64() {
                Json::from(n)
            } else if let Some(n) = i.as_u64() {
                Json::from(n)
            } else {
                Json::from(i.as_f64().unwrap_or(0.0))
            }
        }
        rmpv::Value::F32(f) => serde_json::Number::from_f64(f64::from(*f))
            .map(Json::Number)
            .unwrap_or(Json::Null),
        rmpv::Value::F64(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        rmpv::Value::String(s) => Json::String(s.as_str().unwrap_or("<invalid utf-8>").to_string()),
        rmpv::Value::Binary(bytes) => {
            Json::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        rmpv::Value::Array(items) => Json::Array(items.iter().map(msgpack_to_json).collect()),
        rmpv::Value::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries {
                let key = match k {
                    rmpv::Value::String(s) => s.as_str().unwrap_or("<invalid utf-8>").to_string(),
                    other => other.to_string(),
                };
                map.insert(key, msgpack_to_json(v));
            }
            Json::Object(map)
        }
        rmpv::Value::Ext(tag, bytes) => {
            let mut map = serde_json::Map::new();
            map.insert("ext".into(), Json::from(*tag));
            map.insert(
                "data".into(),
                Json::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
            );
            Json::Object(map)
        }
    }
}

/// Decode a protobuf payload with the configured schema and run the JSON
/// rendering through the JSON formatter.
pub fn format_protobuf(bytes: &[u8], schema: &ProtoSchema, p: &mut Printer) -> Result<()> {
    let pool = load_pool(schema)?;
    let message_name = schema.message.as_deref().ok_or_else(|| {
        Error::Format("protobuf responses need --proto-message to name the message type".into())
    })?;
    let desc = pool.get_message_by_name(message_name).ok_or_else(|| {
        Error::Format(format!("message '{message_name}' not found in the provided schema"))
    })?;

    let message = DynamicMessage::decode(desc, bytes)
        .map_err(|e| Error::Format(format!("decoding protobuf payload: {e}")))?;

    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::new(&mut buf);
    message
        .serialize_with_options(&mut serializer, &SerializeOptions::new())
        .map_err(|e| Error::Format(format!("encoding protobuf intermediate: {e}")))?;

    let mut f = JsonFormatter::new();
    f.feed(&buf, p)?;
    f.finish(p)
}

/// Build the descriptor pool from `--proto-desc` or `--proto-file`.
fn load_pool(schema: &ProtoSchema) -> Result<DescriptorPool> {
    if let Some(desc_path) = &schema.desc {
        let bytes = std::fs::read(desc_path).map_err(|e| {
            crate::error::io_context(e, &format!("reading '{}'", desc_path.display()))
        })?;
        return DescriptorPool::decode(bytes.as_slice()).map_err(|e| {
            Error::Format(format!(
                "decoding descriptor set '{}': {e}",
                desc_path.display()
            ))
        });
    }
    if !schema.files.is_empty() {
        let includes = include_dirs(&schema.files);
        let fds = protox::compile(&schema.files, &includes)
            .map_err(|e| Error::Format(format!("compiling proto files: {e}")))?;
        return DescriptorPool::from_file_descriptor_set(fds)
            .map_err(|e| Error::Format(format!("building descriptor pool: {e}")));
    }
    Err(Error::Format(
        "protobuf responses need --proto-file or --proto-desc".into(),
    ))
}

/// Import roots for proto compilation: the parent directory of each file.
fn include_dirs(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for file in files {
        let dir = file
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}
