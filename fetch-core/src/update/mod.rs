pub mod archive;
pub mod metadata;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use fs2::FileExt as _;
use futures_util::StreamExt;
use regex::Regex;
use serde::Deserialize;

use crate::error::{io_context, Error, Result};
use crate::printer::{Printer, Sequence};
use crate::response::progress::Progress;

/// Release repository coordinates.
const REPO_OWNER: &str = "ryanfowler";
const REPO_NAME: &str = "fetch";

/// Override for the release API base (testing and mirrors).
const API_ENV: &str = "FETCH_INTERNAL_UPDATE_URL";

/// Marks a spawned background update so it try-locks instead of blocking.
pub const BACKGROUND_ENV: &str = "FETCH_INTERNAL_BACKGROUND_UPDATE";

static VERSION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+\.\d+\.\d+$").expect("version tag regex is valid"));

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// Run a self-update.
///
/// `blocking` selects the lock mode: the user-invoked `--update` waits for
/// the advisory lock (with a one-time notice), the periodic background
/// check gives up immediately if another process holds it.
///
/// `last_attempt_at` is recorded regardless of the outcome.
pub async fn run(stderr: &mut Printer, blocking: bool) -> Result<i32> {
    let cache = metadata::cache_dir()?;
    std::fs::create_dir_all(&cache).map_err(|e| io_context(e, "creating cache directory"))?;

    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(metadata::lock_path(&cache))
        .map_err(|e| io_context(e, "opening update lock"))?;

    if lock_file.try_lock_exclusive().is_err() {
        if !blocking {
            log::debug!("another process holds the update lock; skipping background check");
            return Ok(0);
        }
        stderr.write_str("waiting for another fetch update to finish...\n");
        stderr.flush()?;
        let lock_file = tokio::task::spawn_blocking(move || {
            lock_file.lock_exclusive().map(|()| lock_file)
        })
        .await
        .map_err(|e| Error::Update(format!("waiting for update lock: {e}")))?
        .map_err(|e| io_context(e, "acquiring update lock"))?;
        let result = attempt(stderr).await;
        finish(&cache, lock_file, result)
    } else {
        let result = attempt(stderr).await;
        finish(&cache, lock_file, result)
    }
}

/// Record the attempt timestamp and release the lock, preserving the
/// attempt's outcome.
fn finish(cache: &Path, lock_file: std::fs::File, result: Result<i32>) -> Result<i32> {
    if let Err(err) = metadata::record_attempt(
        &metadata::metadata_path(cache),
        time::OffsetDateTime::now_utc(),
    ) {
        log::warn!("recording update metadata: {err}");
    }
    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

async fn attempt(stderr: &mut Printer) -> Result<i32> {
    let current_exe = std::env::current_exe()
        .and_then(std::fs::canonicalize)
        .map_err(|e| io_context(e, "locating current executable"))?;
    let current_version = on_disk_version(&current_exe).await?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Network(format!("building HTTP client: {e}")))?;

    let release = fetch_latest_release(&client).await?;
    if strip_v(&release.tag_name) == strip_v(&current_version) {
        stderr.write_str(&format!("fetch {current_version} is already up to date\n"));
        stderr.flush()?;
        return Ok(0);
    }

    let asset_name = expected_asset_name(&release.tag_name);
    let asset = release
        .assets
        .iter()
        .find(|a| a.name == asset_name)
        .ok_or_else(|| {
            Error::Update(format!(
                "no release artifact '{asset_name}' for this platform; compile from source instead"
            ))
        })?;

    let staging = tempfile::tempdir().map_err(|e| io_context(e, "creating staging directory"))?;
    let archive_path = staging.path().join(&asset.name);
    download(&client, &asset.browser_download_url, &archive_path).await?;

    let extract_dir = staging.path().join("extracted");
    archive::unpack(&archive_path, &extract_dir)?;
    let staged = archive::find_binary(&extract_dir)?;

    replace_executable(&staged, &current_exe)?;

    stderr.write_str(&format!("{current_version} → {}\n", release.tag_name));
    if VERSION_TAG.is_match(&format!("v{}", strip_v(&current_version))) {
        stderr.set(Sequence::Dim);
        stderr.write_str(&format!(
            "changelog: https://github.com/{REPO_OWNER}/{REPO_NAME}/compare/v{}...{}\n",
            strip_v(&current_version),
            release.tag_name
        ));
        stderr.reset();
    }
    stderr.flush()?;
    Ok(0)
}

/// Ask the binary on disk for its version, so a concurrent replacement is
/// observed rather than our in-memory constant.
async fn on_disk_version(exe: &Path) -> Result<String> {
    let output = tokio::process::Command::new(exe)
        .arg("--version")
        .output()
        .await
        .map_err(|e| io_context(e, "invoking --version"))?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| Error::Update(format!("could not parse version from '{}'", text.trim())))
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

async fn fetch_latest_release(client: &reqwest::Client) -> Result<Release> {
    let base =
        std::env::var(API_ENV).unwrap_or_else(|_| "https://api.github.com".to_string());
    let url = format!("{base}/repos/{REPO_OWNER}/{REPO_NAME}/releases/latest");

    let response = client
        .get(&url)
        .header(http::header::USER_AGENT, concat!("fetch/", env!("CARGO_PKG_VERSION")))
        .header(http::header::ACCEPT, "application/vnd.github+json")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(Error::Update(format!(
            "release index returned {}",
            response.status()
        )));
    }
    let body = response.bytes().await?;
    let release: Release = serde_json::from_slice(&body)
        .map_err(|e| Error::Update(format!("decoding release index: {e}")))?;
    if release.tag_name.is_empty() {
        return Err(Error::Update("release index has no tag name".into()));
    }
    Ok(release)
}

/// `fetch-<tag>-<os>-<arch>.<tar.gz|zip>`.
fn expected_asset_name(tag: &str) -> String {
    let ext = if cfg!(windows) { "zip" } else { "tar.gz" };
    format!(
        "fetch-{tag}-{}-{}.{ext}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Stream the artifact to disk with progress on stderr.
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Update(format!(
            "artifact download returned {}",
            response.status()
        )));
    }
    let progress = Progress::for_download(response.content_length(), false);

    let mut file = std::fs::File::create(dest)
        .map_err(|e| io_context(e, &format!("creating '{}'", dest.display())))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        std::io::Write::write_all(&mut file, &chunk)
            .map_err(|e| io_context(e, "writing artifact"))?;
        progress.inc(chunk.len() as u64);
    }
    progress.finish();
    Ok(())
}

/// Replace the running executable with the staged binary.
///
/// The fast path renames over the target. When the staging directory lives
/// on a different filesystem the rename fails; the binary is then copied
/// to a sibling temp path in the executable's directory and renamed from
/// there, which is atomic on the same filesystem.
fn replace_executable(staged: &Path, target: &Path) -> Result<()> {
    #[cfg(windows)]
    {
        let _ = (staged, target);
        return Err(Error::Update(
            "in-place self-update is not supported on Windows; reinstall instead".into(),
        ));
    }

    #[cfg(not(windows))]
    {
        make_executable(staged)?;
        if std::fs::rename(staged, target).is_ok() {
            return Ok(());
        }

        let dir = target
            .parent()
            .ok_or_else(|| Error::Update("executable path has no parent".into()))?;
        let sibling = sibling_temp_path(dir);
        std::fs::copy(staged, &sibling).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => Error::Update(format!(
                "no write permission for '{}'",
                dir.display()
            )),
            _ => io_context(e, "staging replacement binary"),
        })?;
        make_executable(&sibling)?;
        std::fs::rename(&sibling, target).map_err(|e| {
            let _ = std::fs::remove_file(&sibling);
            match e.kind() {
                std::io::ErrorKind::PermissionDenied => Error::Update(format!(
                    "no write permission for '{}'",
                    target.display()
                )),
                _ => io_context(e, "replacing executable"),
            }
        })
    }
}

#[cfg(not(windows))]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| io_context(e, "setting executable permissions"))
}

fn sibling_temp_path(dir: &Path) -> PathBuf {
    dir.join(format!(".fetch-update-{}", std::process::id()))
}

/// Spawn a detached background `fetch --update` when the configured
/// cadence has elapsed. Called after a successful request; never blocks.
pub fn maybe_spawn_background(interval: Duration) {
    if std::env::var_os(BACKGROUND_ENV).is_some() {
        return;
    }
    let Ok(cache) = metadata::cache_dir() else { return };
    if !metadata::check_due(
        &metadata::metadata_path(&cache),
        interval,
        time::OffsetDateTime::now_utc(),
    ) {
        return;
    }
    let Ok(exe) = std::env::current_exe() else { return };
    match std::process::Command::new(exe)
        .arg("--update")
        .env(BACKGROUND_ENV, "1")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        Ok(_) => log::debug!("spawned background update check"),
        Err(err) => log::debug!("spawning background update: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_name_shape() {
        let name = expected_asset_name("v1.2.3");
        assert!(name.starts_with("fetch-v1.2.3-"));
        #[cfg(not(windows))]
        assert!(name.ends_with(".tar.gz"));
        #[cfg(windows)]
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn version_prefix_stripped_for_compare() {
        assert_eq!(strip_v("v1.2.3"), "1.2.3");
        assert_eq!(strip_v("1.2.3"), "1.2.3");
    }

    #[test]
    fn version_tag_regex() {
        assert!(VERSION_TAG.is_match("v1.2.3"));
        assert!(VERSION_TAG.is_match("v0.0.1"));
        assert!(!VERSION_TAG.is_match("1.2.3"));
        assert!(!VERSION_TAG.is_match("v1.2"));
        assert!(!VERSION_TAG.is_match("v1.2.3-rc1"));
    }

    #[test]
    fn release_json_shape() {
        let json = r#"{
            "tag_name": "v9.9.9",
            "assets": [
                {"name": "fetch-v9.9.9-linux-x86_64.tar.gz",
                 "browser_download_url": "https://example.com/a.tar.gz"}
            ],
            "extra_field_ignored": true
        }"#;
        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "v9.9.9");
        assert_eq!(release.assets.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn replace_executable_same_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        let target = dir.path().join("fetch");
        std::fs::write(&staged, b"new").unwrap();
        std::fs::write(&target, b"old").unwrap();

        replace_executable(&staged, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!staged.exists());
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn exclusive_lock_blocks_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = metadata::lock_path(dir.path());
        let first = std::fs::File::create(&path).unwrap();
        first.try_lock_exclusive().unwrap();

        let second = std::fs::File::options().write(true).open(&path).unwrap();
        assert!(second.try_lock_exclusive().is_err());

        fs2::FileExt::unlock(&first).unwrap();
        assert!(second.try_lock_exclusive().is_ok());
    }
}
