pub mod config_file;
pub mod curl;
pub mod shell;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::printer::ColorMode;

/// Default redirect cap when following is enabled.
pub const DEFAULT_REDIRECTS: u32 = 10;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 10.0;

/// Base delay for the first retry; doubles per attempt, capped at 30s.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

// -- Key/value pairs ----------------------------------------------------------

/// An order-preserving (key, value) pair. Header and query order is kept as
/// given, since servers are allowed to care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl KeyVal {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> KeyVal {
        KeyVal {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse a header in `"Name: value"` form. The name is trimmed; the
    /// value keeps interior whitespace. No colon means an empty value.
    pub fn parse_header(s: &str) -> KeyVal {
        match s.split_once(':') {
            Some((name, value)) => KeyVal::new(name.trim(), value.trim()),
            None => KeyVal::new(s.trim(), ""),
        }
    }

    /// Parse a query or form pair in `"key=value"` form. No equals sign
    /// means an empty value.
    pub fn parse_pair(s: &str) -> KeyVal {
        match s.split_once('=') {
            Some((key, value)) => KeyVal::new(key, value),
            None => KeyVal::new(s, ""),
        }
    }
}

// -- Option enums -------------------------------------------------------------

/// Whether to apply type-aware formatting to response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatMode {
    #[default]
    Auto,
    Off,
    On,
}

impl FromStr for FormatMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(FormatMode::Auto),
            "off" => Ok(FormatMode::Off),
            "on" => Ok(FormatMode::On),
            other => Err(format!(
                "The --format option must be 'auto', 'off', or 'on', got '{other}'."
            )),
        }
    }
}

impl fmt::Display for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatMode::Auto => write!(f, "auto"),
            FormatMode::Off => write!(f, "off"),
            FormatMode::On => write!(f, "on"),
        }
    }
}

/// Preferred HTTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    One,
    Two,
    Three,
}

impl FromStr for HttpVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1" => Ok(HttpVersion::One),
            "2" => Ok(HttpVersion::Two),
            "3" => Ok(HttpVersion::Three),
            other => Err(format!(
                "The --http option must be '1', '2', or '3', got '{other}'."
            )),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::One => write!(f, "1"),
            HttpVersion::Two => write!(f, "2"),
            HttpVersion::Three => write!(f, "3"),
        }
    }
}

/// Minimum accepted TLS version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_0,
    V1_1,
    V1_2,
    V1_3,
}

impl FromStr for TlsVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(TlsVersion::V1_0),
            "1.1" => Ok(TlsVersion::V1_1),
            "1.2" => Ok(TlsVersion::V1_2),
            "1.3" => Ok(TlsVersion::V1_3),
            other => Err(format!(
                "The --tls option must be '1.0', '1.1', '1.2', or '1.3', got '{other}'."
            )),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::V1_0 => write!(f, "1.0"),
            TlsVersion::V1_1 => write!(f, "1.1"),
            TlsVersion::V1_2 => write!(f, "1.2"),
            TlsVersion::V1_3 => write!(f, "1.3"),
        }
    }
}

// -- Raw flags ----------------------------------------------------------------

/// The direct result of parsing argv, decoupled from any CLI framework.
///
/// The CLI binary fills this from its parsed arguments; the curl translator
/// and config file then fill fields that are still unset. Fields that a
/// config file may supply are `Option` so "unset" is observable.
#[derive(Debug, Clone, Default)]
pub struct RawFlags {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Vec<String>,
    pub query: Vec<String>,
    pub data: Option<String>,
    pub form: Vec<String>,
    pub multipart: Vec<String>,
    pub json: bool,
    pub xml: bool,
    pub edit: bool,
    pub basic: Option<String>,
    pub bearer: Option<String>,
    pub aws_sigv4: Option<String>,
    pub color: Option<ColorMode>,
    pub format: Option<FormatMode>,
    pub http: Option<HttpVersion>,
    pub tls: Option<TlsVersion>,
    pub insecure: Option<bool>,
    pub cacert: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub timeout: Option<f64>,
    pub connect_timeout: Option<f64>,
    pub redirects: Option<u32>,
    pub retries: Option<u32>,
    pub proxy: Option<String>,
    pub dns_server: Option<String>,
    pub output: Option<String>,
    pub silent: bool,
    pub verbose: u8,
    pub ignore_status: bool,
    pub no_encode: bool,
    pub no_pager: Option<bool>,
    pub dry_run: bool,
    pub proto_file: Vec<String>,
    pub proto_desc: Option<String>,
    pub proto_message: Option<String>,
    pub auto_update: Option<Duration>,
    pub from_curl: Option<String>,
    pub config: Option<String>,
}

/// The mutually-exclusive flag groups, in report order. If two members of
/// the same group are set, the first two by list order are reported.
pub const EXCLUSIVE_GROUPS: &[&[&str]] = &[
    &["aws-sigv4", "basic", "bearer"],
    &["data", "form", "multipart"],
    &["form", "json", "multipart", "xml"],
];

/// Pairs of (flag, alternatives): if `flag` is set, at least one of the
/// alternatives must also be set.
pub const REQUIRED_BY: &[(&str, &[&str])] = &[("edit", &["json", "xml"])];

impl RawFlags {
    /// Whether the named flag is set, for exclusion/requirement checks.
    /// Names are the long option names.
    pub fn is_set(&self, name: &str) -> bool {
        match name {
            "aws-sigv4" => self.aws_sigv4.is_some(),
            "basic" => self.basic.is_some(),
            "bearer" => self.bearer.is_some(),
            "data" => self.data.is_some(),
            "form" => !self.form.is_empty(),
            "multipart" => !self.multipart.is_empty(),
            "json" => self.json,
            "xml" => self.xml,
            "edit" => self.edit,
            _ => false,
        }
    }

    /// Check the exclusive groups and required-by pairs.
    ///
    /// Called once after CLI parsing and again after the curl translation is
    /// applied, so the invariant holds across every merge source.
    pub fn check_exclusions(&self) -> Result<()> {
        for group in EXCLUSIVE_GROUPS {
            let set: Vec<&&str> = group.iter().filter(|name| self.is_set(name)).collect();
            if set.len() > 1 {
                return Err(Error::Cli(format!(
                    "the --{} and --{} options are mutually exclusive",
                    set[0], set[1]
                )));
            }
        }
        for (flag, alternatives) in REQUIRED_BY {
            if self.is_set(flag) && !alternatives.iter().any(|alt| self.is_set(alt)) {
                let alts = alternatives
                    .iter()
                    .map(|a| format!("--{a}"))
                    .collect::<Vec<_>>()
                    .join(" or ");
                return Err(Error::Cli(format!("the --{flag} option requires {alts}")));
            }
        }
        Ok(())
    }
}

// -- Resolved request ---------------------------------------------------------

/// The source of the outbound request body. At most one is ever set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    None,
    /// Literal bytes from the command line.
    Bytes(Vec<u8>),
    /// A file opened and streamed by the builder.
    File(PathBuf),
    /// Standard input, streamed.
    Stdin,
    /// URL-encoded form fields.
    Form(Vec<KeyVal>),
    /// Multipart form-data, written by a streaming producer.
    Multipart(Vec<MultipartField>),
    /// Captured from $EDITOR at build time.
    Edit,
}

impl BodySource {
    pub fn is_none(&self) -> bool {
        matches!(self, BodySource::None)
    }

    /// Short human description for --dry-run output.
    pub fn describe(&self) -> String {
        match self {
            BodySource::None => "none".into(),
            BodySource::Bytes(b) => format!("{} bytes", b.len()),
            BodySource::File(p) => format!("file {}", p.display()),
            BodySource::Stdin => "stdin".into(),
            BodySource::Form(f) => format!("urlencoded form ({} fields)", f.len()),
            BodySource::Multipart(m) => format!("multipart ({} parts)", m.len()),
            BodySource::Edit => "editor".into(),
        }
    }
}

/// One field of a multipart body: either an inline value or a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartField {
    pub name: String,
    pub value: MultipartValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartValue {
    Text(String),
    File(PathBuf),
}

/// Request authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    /// `user:pass`, emitted as a Basic Authorization header.
    Basic(String),
    /// A bearer token.
    Bearer(String),
    /// AWS Signature Version 4.
    AwsSigv4 {
        region: String,
        service: String,
        access_key: String,
        secret_key: String,
    },
}

/// TLS policy for the connection.
#[derive(Debug, Clone, Default)]
pub struct TlsPolicy {
    pub min_version: Option<TlsVersion>,
    pub insecure: bool,
    pub cacert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

/// The single normalized request handed to the builder.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub method: http::Method,
    /// Absolute URL with an http or https scheme. ws/wss is carried in `ws`.
    pub url: Url,
    pub ws: bool,
    pub headers: Vec<KeyVal>,
    pub query: Vec<KeyVal>,
    pub body: BodySource,
    pub auth: Auth,
    pub tls: TlsPolicy,
    pub http_version: Option<HttpVersion>,
    /// Maximum redirects to follow; 0 disables following.
    pub redirects: u32,
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub retries: u32,
    pub retry_base: Duration,
    pub proxy: Option<Url>,
    pub dns_server: Option<SocketAddr>,
    pub verbosity: u8,
    pub silent: bool,
    pub ignore_status: bool,
    pub no_encode: bool,
    pub color: ColorMode,
    pub format: FormatMode,
    pub output: Option<PathBuf>,
    pub no_pager: bool,
    pub dry_run: bool,
    /// Forces content-type/accept synthesis for --json / --xml.
    pub force_json: bool,
    pub force_xml: bool,
    pub proto_files: Vec<PathBuf>,
    pub proto_desc: Option<PathBuf>,
    pub proto_message: Option<String>,
    pub auto_update: Option<Duration>,
}

// -- Resolution ---------------------------------------------------------------

/// Merge-and-validate a `RawFlags` into a `ResolvedRequest`.
///
/// Order of operations:
/// 1. Apply the curl translation (fills unset fields only).
/// 2. Normalize the URL.
/// 3. Load the config file and merge the host section, then the global
///    section, into fields still unset.
/// 4. Validate scheme-specific constraints and build the final request.
///
/// No network I/O happens here.
pub fn resolve(mut raw: RawFlags) -> Result<ResolvedRequest> {
    if let Some(cmd) = raw.from_curl.take() {
        curl::apply(&cmd, &mut raw)?;
        raw.check_exclusions()?;
    }

    let url_input = raw
        .url
        .as_deref()
        .ok_or_else(|| Error::Cli("no URL provided".into()))?;
    let (url, ws) = normalize_url(url_input)?;

    let config = config_file::load(raw.config.as_deref())?;
    if let Some(config) = &config {
        if let Some(host) = url.host_str() {
            if let Some(section) = config.host(host) {
                section.merge_into(&mut raw);
            }
        }
        config.global.merge_into(&mut raw);
    }

    let body = body_source(&raw)?;

    if ws && (!body.is_none() || raw.edit) {
        return Err(Error::Cli(
            "request bodies are not supported for websocket URLs".into(),
        ));
    }

    let auth = resolve_auth(&raw)?;

    let method = match &raw.method {
        Some(m) => parse_method(m)?,
        None if !body.is_none() => http::Method::POST,
        None => http::Method::GET,
    };

    let proxy = match &raw.proxy {
        Some(p) => Some(Url::parse(p).map_err(|e| Error::Cli(format!("invalid proxy URL: {e}")))?),
        None => None,
    };

    let dns_server = match &raw.dns_server {
        Some(s) => Some(parse_dns_server(s)?),
        None => None,
    };

    if let Some(t) = raw.timeout {
        if t <= 0.0 {
            return Err(Error::Cli("the --timeout value must be positive".into()));
        }
    }

    Ok(ResolvedRequest {
        method,
        url,
        ws,
        headers: raw.headers.iter().map(|h| KeyVal::parse_header(h)).collect(),
        query: raw.query.iter().map(|q| KeyVal::parse_pair(q)).collect(),
        body,
        auth,
        tls: TlsPolicy {
            min_version: raw.tls,
            insecure: raw.insecure.unwrap_or(false),
            cacert: raw.cacert.as_ref().map(PathBuf::from),
            cert: raw.cert.as_ref().map(PathBuf::from),
            key: raw.key.as_ref().map(PathBuf::from),
        },
        http_version: raw.http,
        redirects: raw.redirects.unwrap_or(DEFAULT_REDIRECTS),
        timeout: raw.timeout.map(Duration::from_secs_f64),
        connect_timeout: Duration::from_secs_f64(
            raw.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        ),
        retries: raw.retries.unwrap_or(0),
        retry_base: DEFAULT_RETRY_BASE,
        proxy,
        dns_server,
        // The status line shows by default; each -v adds a layer (response
        // headers, then request headers). --silent suppresses them all.
        verbosity: raw.verbose.saturating_add(1),
        silent: raw.silent,
        ignore_status: raw.ignore_status,
        no_encode: raw.no_encode,
        color: raw.color.unwrap_or_default(),
        format: raw.format.unwrap_or_default(),
        output: raw.output.as_ref().map(PathBuf::from),
        no_pager: raw.no_pager.unwrap_or(false),
        dry_run: raw.dry_run,
        force_json: raw.json,
        force_xml: raw.xml,
        proto_files: raw.proto_file.iter().map(PathBuf::from).collect(),
        proto_desc: raw.proto_desc.as_ref().map(PathBuf::from),
        proto_message: raw.proto_message.clone(),
        auto_update: raw.auto_update,
    })
}

fn body_source(raw: &RawFlags) -> Result<BodySource> {
    if raw.edit {
        return Ok(BodySource::Edit);
    }
    if let Some(data) = &raw.data {
        return Ok(match data.strip_prefix('@') {
            Some("-") => BodySource::Stdin,
            Some(path) => BodySource::File(PathBuf::from(path)),
            None => BodySource::Bytes(data.clone().into_bytes()),
        });
    }
    if !raw.form.is_empty() {
        return Ok(BodySource::Form(
            raw.form.iter().map(|f| KeyVal::parse_pair(f)).collect(),
        ));
    }
    if !raw.multipart.is_empty() {
        let fields = raw
            .multipart
            .iter()
            .map(|part| {
                let kv = KeyVal::parse_pair(part);
                let value = match kv.value.strip_prefix('@') {
                    Some(path) => MultipartValue::File(PathBuf::from(path)),
                    None => MultipartValue::Text(kv.value),
                };
                MultipartField {
                    name: kv.key,
                    value,
                }
            })
            .collect();
        return Ok(BodySource::Multipart(fields));
    }
    Ok(BodySource::None)
}

fn resolve_auth(raw: &RawFlags) -> Result<Auth> {
    if let Some(spec) = &raw.aws_sigv4 {
        let (region, service) = curl::parse_sigv4_scope(spec)?;
        let access_key = sigv4_env("AWS_ACCESS_KEY_ID")?;
        let secret_key = sigv4_env("AWS_SECRET_ACCESS_KEY")?;
        return Ok(Auth::AwsSigv4 {
            region,
            service,
            access_key,
            secret_key,
        });
    }
    if let Some(basic) = &raw.basic {
        return Ok(Auth::Basic(basic.clone()));
    }
    if let Some(bearer) = &raw.bearer {
        return Ok(Auth::Bearer(bearer.clone()));
    }
    Ok(Auth::None)
}

fn sigv4_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Cli(format!(
            "the --aws-sigv4 option requires the {name} environment variable to be set"
        ))),
    }
}

fn parse_method(m: &str) -> Result<http::Method> {
    let upper = m.to_ascii_uppercase();
    http::Method::from_bytes(upper.as_bytes())
        .map_err(|_| Error::Cli(format!("invalid method '{m}'")))
}

/// Parse `IP[:PORT]`, defaulting the port to 53.
fn parse_dns_server(s: &str) -> Result<SocketAddr> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 53));
    }
    Err(Error::Cli(format!(
        "the --dns-server value must be IP[:PORT], got '{s}'"
    )))
}

// -- URL normalization --------------------------------------------------------

/// Normalize user URL input into an absolute http(s) URL plus a websocket
/// bit.
///
/// Rules:
/// - The scheme is lowercased.
/// - Without a scheme, the input is treated as `//authority...`: bare IPs
///   and single-label hostnames get `http`, everything else `https`.
/// - `ws` maps to `http` and `wss` to `https`, with the websocket bit set.
/// - Any other scheme is rejected.
pub fn normalize_url(input: &str) -> Result<(Url, bool)> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Cli("no URL provided".into()));
    }

    let with_scheme = match split_scheme(trimmed) {
        Some(_) => trimmed.to_string(),
        None => {
            let host = authority_host(trimmed);
            let scheme = if host.parse::<IpAddr>().is_ok() || !host.contains('.') {
                "http"
            } else {
                "https"
            };
            format!("{scheme}://{trimmed}")
        }
    };

    let mut url = Url::parse(&with_scheme)?;
    let ws = match url.scheme() {
        "http" | "https" => false,
        "ws" => {
            url.set_scheme("http").expect("http is a valid scheme");
            true
        }
        "wss" => {
            url.set_scheme("https").expect("https is a valid scheme");
            true
        }
        other => {
            return Err(Error::Cli(format!(
                "unsupported URL scheme '{other}': expected http, https, ws, or wss"
            )));
        }
    };
    Ok((url, ws))
}

/// Return the scheme if the input has one (letter followed by
/// alphanumerics/+/-/. then "://").
fn split_scheme(s: &str) -> Option<&str> {
    let idx = s.find("://")?;
    let scheme = &s[..idx];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme)
    } else {
        None
    }
}

/// Extract the host portion of a scheme-less input: everything before the
/// first '/', '?', '#', or ':' (port), minus userinfo and IPv6 brackets.
fn authority_host(s: &str) -> &str {
    let end = s
        .find(['/', '?', '#'])
        .unwrap_or(s.len());
    let authority = &s[..end];
    let after_user = match authority.rfind('@') {
        Some(i) => &authority[i + 1..],
        None => authority,
    };
    if let Some(stripped) = after_user.strip_prefix('[') {
        return stripped.split(']').next().unwrap_or(stripped);
    }
    after_user.split(':').next().unwrap_or(after_user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parsing() {
        let kv = KeyVal::parse_header("X-Test: hello");
        assert_eq!(kv.key, "X-Test");
        assert_eq!(kv.value, "hello");

        let kv = KeyVal::parse_header("x-time: 12:34:56");
        assert_eq!(kv.value, "12:34:56");

        let kv = KeyVal::parse_header("flag");
        assert_eq!(kv.key, "flag");
        assert_eq!(kv.value, "");
    }

    #[test]
    fn bare_domain_gets_https() {
        let (url, ws) = normalize_url("example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
        assert!(!ws);
    }

    #[test]
    fn single_label_host_gets_http() {
        let (url, _) = normalize_url("localhost:8080/path").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/path");
    }

    #[test]
    fn bare_ip_gets_http() {
        let (url, _) = normalize_url("127.0.0.1").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1/");

        let (url, _) = normalize_url("[::1]:9000").unwrap();
        assert_eq!(url.as_str(), "http://[::1]:9000/");
    }

    #[test]
    fn query_survives_scheme_inference() {
        let (url, _) = normalize_url("example.com?existing=p").unwrap();
        assert_eq!(url.as_str(), "https://example.com/?existing=p");
    }

    #[test]
    fn scheme_is_lowercased() {
        let (url, _) = normalize_url("HTTPS://EXAMPLE.com/A").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/A");
    }

    #[test]
    fn ws_scheme_rewritten_with_flag() {
        let (url, ws) = normalize_url("wss://echo.example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert!(ws);

        let (url, ws) = normalize_url("ws://echo.example.com").unwrap();
        assert_eq!(url.scheme(), "http");
        assert!(ws);
    }

    #[test]
    fn unsupported_scheme_rejected() {
        assert!(normalize_url("ftp://example.com").is_err());
        assert!(normalize_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn exclusive_group_reports_first_two() {
        let mut raw = RawFlags::default();
        raw.basic = Some("u:p".into());
        raw.bearer = Some("tok".into());
        raw.aws_sigv4 = Some("us-east-1/s3".into());
        let err = raw.check_exclusions().unwrap_err().to_string();
        assert!(err.contains("--aws-sigv4"), "got: {err}");
        assert!(err.contains("--basic"), "got: {err}");
        assert!(!err.contains("--bearer"), "got: {err}");
    }

    #[test]
    fn body_groups_exclusive() {
        let mut raw = RawFlags::default();
        raw.data = Some("x".into());
        raw.form = vec!["a=b".into()];
        assert!(raw.check_exclusions().is_err());

        let mut raw = RawFlags::default();
        raw.json = true;
        raw.xml = true;
        assert!(raw.check_exclusions().is_err());
    }

    #[test]
    fn edit_requires_json_or_xml() {
        let mut raw = RawFlags::default();
        raw.edit = true;
        assert!(raw.check_exclusions().is_err());

        raw.json = true;
        assert!(raw.check_exclusions().is_ok());
    }

    #[test]
    fn method_defaults_follow_body() {
        let mut raw = RawFlags::default();
        raw.url = Some("example.com".into());
        let resolved = resolve(raw.clone()).unwrap();
        assert_eq!(resolved.method, http::Method::GET);

        raw.data = Some("hello".into());
        let resolved = resolve(raw).unwrap();
        assert_eq!(resolved.method, http::Method::POST);
        assert_eq!(resolved.body, BodySource::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn data_at_file_becomes_file_source() {
        let mut raw = RawFlags::default();
        raw.url = Some("example.com".into());
        raw.data = Some("@/tmp/body.json".into());
        let resolved = resolve(raw).unwrap();
        assert_eq!(resolved.body, BodySource::File(PathBuf::from("/tmp/body.json")));
    }

    #[test]
    fn data_at_dash_is_stdin() {
        let mut raw = RawFlags::default();
        raw.url = Some("example.com".into());
        raw.data = Some("@-".into());
        let resolved = resolve(raw).unwrap();
        assert_eq!(resolved.body, BodySource::Stdin);
    }

    #[test]
    fn ws_url_rejects_body() {
        let mut raw = RawFlags::default();
        raw.url = Some("wss://echo.example.com".into());
        raw.data = Some("hi".into());
        assert!(resolve(raw).is_err());
    }

    #[test]
    fn sigv4_requires_env() {
        // The test environment does not export AWS credentials; resolution
        // must fail with a message naming the missing variable.
        std::env::remove_var("AWS_ACCESS_KEY_ID");
        let mut raw = RawFlags::default();
        raw.url = Some("mybucket.example.com".into());
        raw.aws_sigv4 = Some("us-east-1/s3".into());
        let err = resolve(raw).unwrap_err().to_string();
        assert!(err.contains("AWS_ACCESS_KEY_ID"), "got: {err}");
    }

    #[test]
    fn dns_server_value_formats() {
        assert_eq!(
            parse_dns_server("1.1.1.1").unwrap(),
            "1.1.1.1:53".parse().unwrap()
        );
        assert_eq!(
            parse_dns_server("10.0.0.2:5353").unwrap(),
            "10.0.0.2:5353".parse().unwrap()
        );
        assert!(parse_dns_server("not-an-ip").is_err());
    }

    #[test]
    fn multipart_file_fields_detected() {
        let mut raw = RawFlags::default();
        raw.url = Some("example.com".into());
        raw.multipart = vec!["name=alice".into(), "avatar=@/tmp/a.png".into()];
        let resolved = resolve(raw).unwrap();
        match resolved.body {
            BodySource::Multipart(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].value, MultipartValue::Text("alice".into()));
                assert_eq!(
                    fields[1].value,
                    MultipartValue::File(PathBuf::from("/tmp/a.png"))
                );
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }
}
