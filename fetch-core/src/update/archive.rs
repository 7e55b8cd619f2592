use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::{io_context, Error, Result};

/// Unpack a release archive into `dest`. The format is chosen by file
/// name: `.tar.gz` or `.zip`.
///
/// Every entry path is validated before any byte is written: absolute
/// paths and `..` components are rejected, and the joined destination must
/// stay under `dest`.
pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| io_context(e, "creating unpack directory"))?;
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        unpack_tar_gz(archive, dest)
    } else if name.ends_with(".zip") {
        unpack_zip(archive, dest)
    } else {
        Err(Error::Update(format!(
            "unsupported archive format '{name}'"
        )))
    }
}

fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)
        .map_err(|e| io_context(e, &format!("opening '{}'", archive.display())))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);

    for entry in tar
        .entries()
        .map_err(|e| Error::Update(format!("reading archive: {e}")))?
    {
        let mut entry = entry.map_err(|e| Error::Update(format!("reading archive entry: {e}")))?;
        let rel = entry
            .path()
            .map_err(|e| Error::Update(format!("archive entry path: {e}")))?
            .into_owned();
        let target = safe_join(dest, &rel)?;

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| io_context(e, "creating archive directory"))?;
            continue;
        }
        if !kind.is_file() {
            // Links and specials are not part of release archives.
            log::debug!("skipping non-regular archive entry {}", rel.display());
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| io_context(e, "creating archive directory"))?;
        }
        let mut out = std::fs::File::create(&target)
            .map_err(|e| io_context(e, &format!("creating '{}'", target.display())))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| io_context(e, &format!("extracting '{}'", rel.display())))?;

        #[cfg(unix)]
        if let Ok(mode) = entry.header().mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode));
        }
    }
    Ok(())
}

fn unpack_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)
        .map_err(|e| io_context(e, &format!("opening '{}'", archive.display())))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| Error::Update(format!("reading zip: {e}")))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::Update(format!("reading zip entry: {e}")))?;
        let rel = PathBuf::from(entry.name());
        let target = safe_join(dest, &rel)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| io_context(e, "creating archive directory"))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| io_context(e, "creating archive directory"))?;
        }
        let mut out = std::fs::File::create(&target)
            .map_err(|e| io_context(e, &format!("creating '{}'", target.display())))?;
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| io_context(e, "extracting zip entry"))?;
        std::io::Write::write_all(&mut out, &buf)
            .map_err(|e| io_context(e, "writing extracted file"))?;
    }
    Ok(())
}

/// Join an archive-relative path onto the destination, rejecting escapes.
fn safe_join(dest: &Path, rel: &Path) -> Result<PathBuf> {
    let mut out = dest.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Update(format!(
                    "archive entry '{}' escapes the unpack directory",
                    rel.display()
                )));
            }
        }
    }
    if !out.starts_with(dest) {
        return Err(Error::Update(format!(
            "archive entry '{}' escapes the unpack directory",
            rel.display()
        )));
    }
    Ok(out)
}

/// Locate the `fetch` binary inside the unpacked tree.
pub fn find_binary(dir: &Path) -> Result<PathBuf> {
    let names = ["fetch", "fetch.exe"];
    let mut fallback: Option<PathBuf> = None;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries =
            std::fs::read_dir(&current).map_err(|e| io_context(e, "scanning unpacked archive"))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_context(e, "scanning unpacked archive"))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if names.contains(&name) {
                    return Ok(path);
                }
                fallback.get_or_insert(path);
            }
        }
    }
    fallback.ok_or_else(|| Error::Update("no binary found in the release archive".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_tar_gz(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".tar.gz").tempfile().unwrap();
        let encoder =
            flate2::write::GzEncoder::new(file.reopen().unwrap(), flate2::Compression::fast());
        let mut tar = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            tar.append_data(&mut header, name, *data).unwrap();
        }
        tar.into_inner().unwrap().finish().unwrap();
        file
    }

    #[test]
    fn tar_gz_unpacks_files() {
        let archive = make_tar_gz(&[("fetch", b"#!bin"), ("README.md", b"docs")]);
        let dest = tempfile::tempdir().unwrap();
        unpack(archive.path(), dest.path()).unwrap();
        assert_eq!(std::fs::read(dest.path().join("fetch")).unwrap(), b"#!bin");
        assert_eq!(
            std::fs::read(dest.path().join("README.md")).unwrap(),
            b"docs"
        );
    }

    #[test]
    fn traversal_entries_rejected() {
        let archive = make_tar_gz(&[("../evil", b"pwned")]);
        let dest = tempfile::tempdir().unwrap();
        let err = unpack(archive.path(), dest.path()).unwrap_err();
        assert!(err.to_string().contains("escapes"), "got: {err}");
        assert!(!dest.path().parent().unwrap().join("evil").exists());
    }

    #[test]
    fn zip_unpacks_and_guards() {
        let file = tempfile::Builder::new().suffix(".zip").tempfile().unwrap();
        {
            let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
            let options: zip::write::SimpleFileOptions = Default::default();
            zip.start_file("fetch.exe", options).unwrap();
            zip.write_all(b"mz").unwrap();
            zip.finish().unwrap();
        }
        let dest = tempfile::tempdir().unwrap();
        unpack(file.path(), dest.path()).unwrap();
        assert_eq!(
            std::fs::read(dest.path().join("fetch.exe")).unwrap(),
            b"mz"
        );
    }

    #[test]
    fn safe_join_rules() {
        let dest = Path::new("/tmp/unpack");
        assert_eq!(
            safe_join(dest, Path::new("dir/file")).unwrap(),
            Path::new("/tmp/unpack/dir/file")
        );
        assert!(safe_join(dest, Path::new("../file")).is_err());
        assert!(safe_join(dest, Path::new("/abs")).is_err());
        assert!(safe_join(dest, Path::new("a/../../b")).is_err());
    }

    #[test]
    fn find_binary_prefers_exact_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("LICENSE"), b"mit").unwrap();
        let nested = dir.path().join("bin");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("fetch"), b"elf").unwrap();
        assert_eq!(find_binary(dir.path()).unwrap(), nested.join("fetch"));
    }

    #[test]
    fn unknown_format_rejected() {
        let file = tempfile::Builder::new().suffix(".rar").tempfile().unwrap();
        let dest = tempfile::tempdir().unwrap();
        assert!(unpack(file.path(), dest.path()).is_err());
    }
}
