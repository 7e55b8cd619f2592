use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{io_context, Error, Result};

/// Update state persisted in the user cache directory.
///
/// Written via temp-file-and-rename at the end of every update attempt,
/// read to decide whether the periodic background check is due.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateMetadata {
    /// RFC-3339 UTC instant of the last attempt, successful or not.
    pub last_attempt_at: String,
}

/// `<cache-dir>/fetch`.
pub fn cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("fetch"))
        .ok_or_else(|| Error::Update("no cache directory available on this system".into()))
}

pub fn metadata_path(cache: &Path) -> PathBuf {
    cache.join("metadata.json")
}

pub fn lock_path(cache: &Path) -> PathBuf {
    cache.join(".update-lock")
}

/// Read the metadata file; absent or malformed state reads as `None`.
pub fn load(path: &Path) -> Option<UpdateMetadata> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Record `last_attempt_at = now` atomically (temp file, then rename).
pub fn record_attempt(path: &Path, now: OffsetDateTime) -> Result<()> {
    let meta = UpdateMetadata {
        last_attempt_at: now
            .format(&Rfc3339)
            .map_err(|e| Error::Update(format!("formatting timestamp: {e}")))?,
    };
    let dir = path
        .parent()
        .ok_or_else(|| Error::Update("metadata path has no parent".into()))?;
    std::fs::create_dir_all(dir).map_err(|e| io_context(e, "creating cache directory"))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_context(e, "creating metadata temp file"))?;
    serde_json::to_writer(&mut tmp, &meta)
        .map_err(|e| Error::Update(format!("encoding metadata: {e}")))?;
    tmp.flush().map_err(|e| io_context(e, "writing metadata"))?;
    tmp.persist(path)
        .map_err(|e| io_context(e.error, "replacing metadata file"))?;
    Ok(())
}

/// Whether a background check is due: no metadata yet, or the recorded
/// attempt is older than `interval`.
pub fn check_due(path: &Path, interval: Duration, now: OffsetDateTime) -> bool {
    let Some(meta) = load(path) else { return true };
    let Ok(last) = OffsetDateTime::parse(&meta.last_attempt_at, &Rfc3339) else {
        return true;
    };
    now - last >= interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn record_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = metadata_path(dir.path());
        record_attempt(&path, datetime!(2024-06-01 12:00:00 UTC)).unwrap();

        let meta = load(&path).unwrap();
        assert_eq!(meta.last_attempt_at, "2024-06-01T12:00:00Z");
    }

    #[test]
    fn missing_or_malformed_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = metadata_path(dir.path());
        assert!(load(&path).is_none());

        std::fs::write(&path, "{not json").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn check_due_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = metadata_path(dir.path());
        let day = Duration::from_secs(86400);

        // No metadata yet: due.
        assert!(check_due(&path, day, datetime!(2024-06-02 00:00:00 UTC)));

        record_attempt(&path, datetime!(2024-06-01 00:00:00 UTC)).unwrap();
        assert!(!check_due(&path, day, datetime!(2024-06-01 12:00:00 UTC)));
        assert!(check_due(&path, day, datetime!(2024-06-02 00:00:01 UTC)));
    }

    #[test]
    fn record_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = metadata_path(dir.path());
        record_attempt(&path, datetime!(2024-01-01 00:00:00 UTC)).unwrap();
        record_attempt(&path, datetime!(2024-02-02 00:00:00 UTC)).unwrap();
        let meta = load(&path).unwrap();
        assert_eq!(meta.last_attempt_at, "2024-02-02T00:00:00Z");
    }
}
