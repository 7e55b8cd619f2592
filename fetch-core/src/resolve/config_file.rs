use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::resolve::{FormatMode, HttpVersion, RawFlags, TlsVersion};
use crate::printer::ColorMode;

/// Options a config-file section may set. Every field mirrors a long option
/// name; `None`/empty means "not set here".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostConfig {
    pub color: Option<ColorMode>,
    pub format: Option<FormatMode>,
    pub http: Option<HttpVersion>,
    pub tls: Option<TlsVersion>,
    pub insecure: Option<bool>,
    pub timeout: Option<f64>,
    pub connect_timeout: Option<f64>,
    pub redirects: Option<u32>,
    pub retries: Option<u32>,
    pub proxy: Option<String>,
    pub dns_server: Option<String>,
    pub headers: Vec<String>,
    pub query: Vec<String>,
    pub no_pager: Option<bool>,
    pub auto_update: Option<Duration>,
}

impl HostConfig {
    /// Copy every field whose receiver is still unset. Lists are copied
    /// only when the receiver list is empty.
    pub fn merge_into(&self, raw: &mut RawFlags) {
        if raw.color.is_none() {
            raw.color = self.color;
        }
        if raw.format.is_none() {
            raw.format = self.format;
        }
        if raw.http.is_none() {
            raw.http = self.http;
        }
        if raw.tls.is_none() {
            raw.tls = self.tls;
        }
        if raw.insecure.is_none() {
            raw.insecure = self.insecure;
        }
        if raw.timeout.is_none() {
            raw.timeout = self.timeout;
        }
        if raw.connect_timeout.is_none() {
            raw.connect_timeout = self.connect_timeout;
        }
        if raw.redirects.is_none() {
            raw.redirects = self.redirects;
        }
        if raw.retries.is_none() {
            raw.retries = self.retries;
        }
        if raw.proxy.is_none() {
            raw.proxy = self.proxy.clone();
        }
        if raw.dns_server.is_none() {
            raw.dns_server = self.dns_server.clone();
        }
        if raw.headers.is_empty() {
            raw.headers = self.headers.clone();
        }
        if raw.query.is_empty() {
            raw.query = self.query.clone();
        }
        if raw.no_pager.is_none() {
            raw.no_pager = self.no_pager;
        }
        if raw.auto_update.is_none() {
            raw.auto_update = self.auto_update;
        }
    }
}

/// A parsed config file: a `[global]` section plus host-scoped sections.
/// Read once at resolution time; read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub global: HostConfig,
    hosts: Vec<(String, HostConfig)>,
}

impl ConfigFile {
    /// Case-insensitive host section lookup.
    pub fn host(&self, name: &str) -> Option<&HostConfig> {
        self.hosts
            .iter()
            .find(|(host, _)| host.eq_ignore_ascii_case(name))
            .map(|(_, section)| section)
    }
}

/// Default config path: `<config-dir>/fetch/config`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fetch").join("config"))
}

/// Load the config file. With an explicit override the file must exist;
/// the default location is optional.
pub fn load(override_path: Option<&str>) -> Result<Option<ConfigFile>> {
    let (path, required) = match override_path {
        Some(p) => (PathBuf::from(p), true),
        None => match default_path() {
            Some(p) => (p, false),
            None => return Ok(None),
        },
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => parse(&text, &path).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Ok(None),
        Err(e) => Err(crate::error::io_context(
            e,
            &format!("reading config file '{}'", path.display()),
        )),
    }
}

/// Parse the INI-ish config grammar:
///
/// ```text
/// [global]
/// timeout = 30
/// headers = [ "X-A: 1", "X-B: 2" ]
///
/// [api.example.com]
/// http = 2
/// auto-update = 24h
/// ```
///
/// `#` and `;` start comments. Unknown keys fail the parse.
pub fn parse(text: &str, path: &Path) -> Result<ConfigFile> {
    let mut config = ConfigFile::default();
    let mut current: Option<String> = None;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| {
                config_err(path, lineno, "unterminated section header")
            })?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(config_err(path, lineno, "empty section name"));
            }
            if name != "global" && config.host(&name).is_none() {
                config.hosts.push((name.clone(), HostConfig::default()));
            }
            current = Some(name);
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| config_err(path, lineno, "expected 'key = value'"))?;
        let key = key.trim();
        let value = value.trim();

        let section = match current.as_deref() {
            Some("global") => &mut config.global,
            Some(host) => {
                let host = host.to_string();
                &mut config
                    .hosts
                    .iter_mut()
                    .find(|(h, _)| *h == host)
                    .expect("section exists once header is seen")
                    .1
            }
            None => {
                return Err(config_err(
                    path,
                    lineno,
                    "key outside of a [global] or [hostname] section",
                ));
            }
        };

        apply_key(section, key, value).map_err(|msg| config_err(path, lineno, &msg))?;
    }

    Ok(config)
}

fn strip_comment(line: &str) -> &str {
    // Comments start at an unquoted '#' or ';'.
    let mut in_quote = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            '#' | ';' if !in_quote => return &line[..i],
            _ => {}
        }
    }
    line
}

fn config_err(path: &Path, lineno: usize, msg: &str) -> Error {
    Error::Config(format!("{}:{lineno}: {msg}", path.display()))
}

fn apply_key(section: &mut HostConfig, key: &str, value: &str) -> std::result::Result<(), String> {
    match key {
        "color" => section.color = Some(scalar(value).parse::<ColorMode>()?),
        "format" => section.format = Some(scalar(value).parse::<FormatMode>()?),
        "http" => section.http = Some(scalar(value).parse::<HttpVersion>()?),
        "tls" => section.tls = Some(scalar(value).parse::<TlsVersion>()?),
        "insecure" => section.insecure = Some(parse_bool(value)?),
        "timeout" => section.timeout = Some(parse_float(key, value)?),
        "connect-timeout" => section.connect_timeout = Some(parse_float(key, value)?),
        "redirects" => section.redirects = Some(parse_int(key, value)?),
        "retries" => section.retries = Some(parse_int(key, value)?),
        "proxy" => section.proxy = Some(scalar(value).to_string()),
        "dns-server" => section.dns_server = Some(scalar(value).to_string()),
        "headers" => section.headers = parse_list(key, value)?,
        "query" => section.query = parse_list(key, value)?,
        "no-pager" => section.no_pager = Some(parse_bool(value)?),
        "auto-update" => section.auto_update = Some(parse_duration(value)?),
        other => return Err(format!("unknown key '{other}'")),
    }
    Ok(())
}

/// Strip one pair of surrounding double quotes, if present.
fn scalar(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match scalar(value) {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected 'true' or 'false', got '{other}'")),
    }
}

fn parse_float(key: &str, value: &str) -> std::result::Result<f64, String> {
    scalar(value)
        .parse::<f64>()
        .ok()
        .filter(|v| *v >= 0.0)
        .ok_or_else(|| format!("invalid {key} value '{value}'"))
}

fn parse_int(key: &str, value: &str) -> std::result::Result<u32, String> {
    scalar(value)
        .parse::<u32>()
        .map_err(|_| format!("invalid {key} value '{value}'"))
}

/// Parse `[ "a", "b" ]` into a list of strings.
fn parse_list(key: &str, value: &str) -> std::result::Result<Vec<String>, String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| format!("expected a [ \"...\" ] list for {key}"))?;
    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            let stripped = scalar(item);
            if stripped == item && item.contains('"') {
                return Err(format!("malformed list item {item} for {key}"));
            }
            Ok(stripped.to_string())
        })
        .collect()
}

/// Parse a duration literal: `24h`, `30m`, `90s`, `7d`, or a bare number
/// of seconds.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let value = scalar(value).trim();
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{value}'"))?;
    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86400,
        other => return Err(format!("invalid duration unit '{other}' in '{value}'")),
    };
    Ok(Duration::from_secs(secs))
}
