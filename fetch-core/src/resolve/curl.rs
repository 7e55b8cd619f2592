use crate::error::{Error, Result};
use crate::resolve::{shell, RawFlags};

/// Translate a `curl` command line and apply it onto `raw`.
///
/// The command is tokenized with shell quoting rules, a leading `curl` word
/// is stripped, and the recognized curl flags are folded into an
/// intermediate record. The intermediate is then merged into `raw` with the
/// same precedence as native flags: values already set on `raw` win,
/// multi-valued collections append.
pub fn apply(command: &str, raw: &mut RawFlags) -> Result<()> {
    let words = shell::split(command)?;
    let mut words = words.as_slice();
    if words.first().map(String::as_str) == Some("curl") {
        words = &words[1..];
    }
    let parsed = parse(words)?;
    merge(parsed, raw)
}

// -- Intermediate record ------------------------------------------------------

/// One `-d`-family payload item. The expansion policy differs per flag, so
/// the raw value is carried until join time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DataItem {
    /// `-d`, `--data`, `--data-ascii`: `@file` expands, newlines stripped.
    Ascii(String),
    /// `--data-binary`: `@file` expands, bytes kept verbatim.
    Binary(String),
    /// `--data-raw`: no `@file` expansion.
    Raw(String),
    /// `--data-urlencode`: one of `content`, `=content`, `name=content`,
    /// `@file`, `name@file`; content is URL-encoded at join time.
    UrlEncode(String),
}

#[derive(Debug, Default)]
struct CurlRequest {
    url: Option<String>,
    method: Option<String>,
    head: bool,
    headers: Vec<String>,
    data: Vec<DataItem>,
    get_mode: bool,
    json: Vec<String>,
    user: Option<String>,
    bearer: Option<String>,
    aws_sigv4: Option<String>,
    multipart: Vec<String>,
    cookies: Vec<String>,
    output: Option<String>,
    upload_file: Option<String>,
    insecure: bool,
    proxy: Option<String>,
    connect_timeout: Option<f64>,
    max_time: Option<f64>,
    follow: bool,
    max_redirs: Option<u32>,
    proto: Option<ProtoAllow>,
    silent: bool,
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProtoAllow {
    http: bool,
    https: bool,
}

// -- Parsing ------------------------------------------------------------------

fn parse(words: &[String]) -> Result<CurlRequest> {
    let mut req = CurlRequest::default();
    let mut iter = words.iter().map(String::as_str);
    let mut positional_only = false;

    while let Some(word) = iter.next() {
        if positional_only || !word.starts_with('-') || word == "-" {
            set_positional_url(&mut req, word)?;
            continue;
        }
        if word == "--" {
            positional_only = true;
            continue;
        }

        // Long options may carry `=value`; short options may carry an
        // attached value (`-dfoo`) or cluster no-arg flags (`-sv`).
        const VALUE_SHORTS: &[&str] = &[
            "-X", "-H", "-d", "-u", "-F", "-b", "-o", "-T", "-x", "-m", "-A", "-e",
        ];
        let (flag, inline_value): (&str, Option<String>) = if word.starts_with("--") {
            match word.split_once('=') {
                Some((f, v)) => (f, Some(v.to_string())),
                None => (word, None),
            }
        } else if word.len() > 2 && VALUE_SHORTS.contains(&&word[..2]) {
            (&word[..2], Some(word[2..].to_string()))
        } else if word.len() > 2 && word[1..].chars().all(|c| matches!(c, 's' | 'v' | 'k' | 'L' | 'G' | 'I' | 'f')) {
            // A cluster of known no-arg shorts: expand in place.
            for c in word[1..].chars() {
                match c {
                    's' => req.silent = true,
                    'v' => req.verbose += 1,
                    'k' => req.insecure = true,
                    'L' => req.follow = true,
                    'G' => req.get_mode = true,
                    'I' => req.head = true,
                    'f' => {}
                    _ => unreachable!(),
                }
            }
            continue;
        } else {
            (word, None)
        };

        let mut value = |name: &str| -> Result<String> {
            if let Some(v) = &inline_value {
                return Ok(v.clone());
            }
            iter.next()
                .map(str::to_string)
                .ok_or_else(|| Error::Cli(format!("curl flag {name} is missing its argument")))
        };

        match flag {
            "-X" | "--request" => req.method = Some(value(flag)?),
            "-I" | "--head" => req.head = true,
            "-H" | "--header" => req.headers.push(value(flag)?),
            "-d" | "--data" | "--data-ascii" => req.data.push(DataItem::Ascii(value(flag)?)),
            "--data-binary" => req.data.push(DataItem::Binary(value(flag)?)),
            "--data-raw" => req.data.push(DataItem::Raw(value(flag)?)),
            "--data-urlencode" => req.data.push(DataItem::UrlEncode(value(flag)?)),
            "-G" | "--get" => req.get_mode = true,
            "--json" => req.json.push(value(flag)?),
            "-u" | "--user" => req.user = Some(value(flag)?),
            "--oauth2-bearer" => req.bearer = Some(value(flag)?),
            "--aws-sigv4" => req.aws_sigv4 = Some(value(flag)?),
            "-F" | "--form" => req.multipart.push(value(flag)?),
            "-b" | "--cookie" => {
                let v = value(flag)?;
                if !v.contains('=') {
                    return Err(Error::Cli(format!(
                        "cookie files are not supported ({flag} {v}): pass cookies inline as 'name=value'"
                    )));
                }
                req.cookies.push(v);
            }
            "-o" | "--output" => req.output = Some(value(flag)?),
            "-T" | "--upload-file" => req.upload_file = Some(value(flag)?),
            "-k" | "--insecure" => req.insecure = true,
            "-x" | "--proxy" => req.proxy = Some(value(flag)?),
            "--connect-timeout" => req.connect_timeout = Some(parse_secs(flag, &value(flag)?)?),
            "-m" | "--max-time" => req.max_time = Some(parse_secs(flag, &value(flag)?)?),
            "-L" | "--location" | "--location-trusted" => req.follow = true,
            "--max-redirs" => {
                let v = value(flag)?;
                req.max_redirs = Some(v.parse().map_err(|_| {
                    Error::Cli(format!("invalid --max-redirs value '{v}'"))
                })?);
            }
            "--proto" => req.proto = Some(parse_proto(&value(flag)?)?),
            "--url" => set_positional_url(&mut req, &value(flag)?)?,
            "-A" | "--user-agent" => {
                let v = value(flag)?;
                req.headers.push(format!("User-Agent: {v}"));
            }
            "-e" | "--referer" => {
                let v = value(flag)?;
                req.headers.push(format!("Referer: {v}"));
            }
            "-s" | "--silent" => req.silent = true,
            "-v" | "--verbose" => req.verbose += 1,
            "--compressed" => {
                // Compressed responses are requested and decoded by default.
            }
            "--progress-bar" | "-#" | "--no-progress-meter" => {}
            "-f" | "--fail" | "--fail-with-body" => {
                // Non-2xx statuses already map to non-zero exit codes.
            }
            other => {
                return Err(Error::Cli(format!(
                    "unsupported curl flag '{other}' in --from-curl command"
                )));
            }
        }
    }

    Ok(req)
}

fn set_positional_url(req: &mut CurlRequest, word: &str) -> Result<()> {
    if req.url.is_some() {
        return Err(Error::Cli(
            "multiple URLs in --from-curl command; only one is supported".into(),
        ));
    }
    req.url = Some(word.to_string());
    Ok(())
}

fn parse_secs(flag: &str, v: &str) -> Result<f64> {
    v.parse::<f64>()
        .ok()
        .filter(|s| *s >= 0.0)
        .ok_or_else(|| Error::Cli(format!("invalid {flag} value '{v}'")))
}

/// Parse curl's `--proto` syntax: `[=]proto[,[+-=]proto]...`.
///
/// `=` replaces the allowed set, `+` adds, `-` removes. Only http and https
/// are meaningful here; other protocol names are ignored since the URL
/// schemes accepted elsewhere already exclude them.
fn parse_proto(spec: &str) -> Result<ProtoAllow> {
    let mut allow = ProtoAllow {
        http: true,
        https: true,
    };
    let mut first = true;
    for token in spec.split(',') {
        let (op, name) = match token.chars().next() {
            Some('=') => ('=', &token[1..]),
            Some('+') => ('+', &token[1..]),
            Some('-') => ('-', &token[1..]),
            _ => (if first { '=' } else { '+' }, token),
        };
        if op == '=' {
            allow = ProtoAllow {
                http: false,
                https: false,
            };
        }
        let enable = op != '-';
        match name {
            "http" => allow.http = enable,
            "https" => allow.https = enable,
            "all" => {
                allow.http = enable;
                allow.https = enable;
            }
            "" => return Err(Error::Cli(format!("invalid --proto value '{spec}'"))),
            _ => {}
        }
        first = false;
    }
    if !allow.http && !allow.https {
        return Err(Error::Cli(format!(
            "--proto '{spec}' does not allow http or https"
        )));
    }
    Ok(allow)
}

// -- Merging ------------------------------------------------------------------

fn merge(parsed: CurlRequest, raw: &mut RawFlags) -> Result<()> {
    // Headers, cookies, and the --json header synthesis. User-specified
    // headers always win over synthesized ones.
    raw.headers.extend(parsed.headers.iter().cloned());
    for cookie in &parsed.cookies {
        raw.headers.push(format!("Cookie: {cookie}"));
    }

    if !parsed.json.is_empty() {
        if !has_header(raw, "content-type") {
            raw.headers.push("Content-Type: application/json".into());
        }
        if !has_header(raw, "accept") {
            raw.headers.push("Accept: application/json".into());
        }
    }

    // Assemble the body from the -d family and --json, joined by '&' the
    // way curl does (a lone --json value is the common case).
    let mut body_items = parsed.data.clone();
    body_items.extend(parsed.json.iter().cloned().map(DataItem::Raw));

    if parsed.get_mode {
        // -G: data moves to the query string; the body stays empty.
        for item in &body_items {
            let expanded = expand_item(item)?;
            for piece in expanded.split('&').filter(|p| !p.is_empty()) {
                raw.query.push(piece.to_string());
            }
        }
    } else if !body_items.is_empty() && raw.data.is_none() {
        raw.data = Some(join_items(&body_items)?);
    }

    if let Some(upload) = &parsed.upload_file {
        if raw.data.is_none() {
            raw.data = Some(format!("@{upload}"));
            if raw.method.is_none() && parsed.method.is_none() {
                raw.method = Some("PUT".into());
            }
        }
    }

    if raw.method.is_none() {
        if let Some(method) = parsed.method {
            raw.method = Some(method);
        } else if parsed.head {
            raw.method = Some("HEAD".into());
        } else if parsed.get_mode {
            raw.method = Some("GET".into());
        }
    }

    if raw.multipart.is_empty() {
        raw.multipart = parsed.multipart;
    }

    if raw.basic.is_none() && raw.bearer.is_none() && raw.aws_sigv4.is_none() {
        if let Some(spec) = parsed.aws_sigv4 {
            let (region, service) = parse_sigv4_scope(&spec)?;
            raw.aws_sigv4 = Some(format!("{region}/{service}"));
        } else if let Some(bearer) = parsed.bearer {
            raw.bearer = Some(bearer);
        } else if let Some(user) = parsed.user {
            raw.basic = Some(user);
        }
    }

    if raw.url.is_none() {
        raw.url = parsed.url;
    }
    if let Some(allow) = parsed.proto {
        enforce_proto(allow, raw)?;
    }

    if raw.insecure.is_none() && parsed.insecure {
        raw.insecure = Some(true);
    }
    if raw.proxy.is_none() {
        raw.proxy = parsed.proxy;
    }
    if raw.output.is_none() {
        raw.output = parsed.output;
    }
    if raw.connect_timeout.is_none() {
        raw.connect_timeout = parsed.connect_timeout;
    }
    if raw.timeout.is_none() {
        raw.timeout = parsed.max_time;
    }
    if raw.redirects.is_none() {
        if let Some(n) = parsed.max_redirs {
            raw.redirects = Some(n);
        } else if !parsed.follow {
            // curl does not follow redirects unless -L is given.
            raw.redirects = Some(0);
        }
    }
    raw.silent |= parsed.silent;
    raw.verbose = raw.verbose.max(parsed.verbose);

    Ok(())
}

fn has_header(raw: &RawFlags, name: &str) -> bool {
    raw.headers.iter().any(|h| {
        h.split(':')
            .next()
            .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
    })
}

/// Force the URL scheme to satisfy a `--proto` constraint. A scheme-less
/// URL is pinned to the most restrictive allowed scheme; an explicit
/// disallowed scheme is an error.
fn enforce_proto(allow: ProtoAllow, raw: &mut RawFlags) -> Result<()> {
    let Some(url) = &raw.url else { return Ok(()) };
    let lower = url.to_ascii_lowercase();
    if let Some(scheme) = lower.split("://").next().filter(|_| lower.contains("://")) {
        let allowed = match scheme {
            "http" => allow.http,
            "https" | "wss" => allow.https,
            "ws" => allow.http,
            _ => true,
        };
        if !allowed {
            return Err(Error::Cli(format!(
                "URL scheme '{scheme}' is not allowed by --proto"
            )));
        }
    } else {
        let scheme = if allow.https { "https" } else { "http" };
        raw.url = Some(format!("{scheme}://{url}"));
    }
    Ok(())
}

// -- Data item expansion ------------------------------------------------------

fn join_items(items: &[DataItem]) -> Result<String> {
    // A single `@file` item stays deferred so the builder can stream it.
    if let [DataItem::Ascii(v) | DataItem::Binary(v)] = items {
        if v.starts_with('@') {
            return Ok(v.clone());
        }
    }

    let mut joined = String::new();
    for item in items {
        if !joined.is_empty() {
            joined.push('&');
        }
        joined.push_str(&expand_item(item)?);
    }
    Ok(joined)
}

fn expand_item(item: &DataItem) -> Result<String> {
    match item {
        DataItem::Raw(v) => Ok(v.clone()),
        DataItem::Ascii(v) => match v.strip_prefix('@') {
            Some(path) => {
                let contents = read_data_file(path)?;
                Ok(contents.replace(['\r', '\n'], ""))
            }
            None => Ok(v.clone()),
        },
        DataItem::Binary(v) => match v.strip_prefix('@') {
            Some(path) => read_data_file(path),
            None => Ok(v.clone()),
        },
        DataItem::UrlEncode(v) => expand_urlencode(v),
    }
}

/// Expand one `--data-urlencode` form:
/// `name=content`, `=content`, `content`, `@file`, or `name@file`.
/// Content is encoded with `+` for space and `%HH` for reserved bytes.
fn expand_urlencode(v: &str) -> Result<String> {
    let eq = v.find('=');
    let at = v.find('@');
    match (eq, at) {
        // `=content` or `name=content`: '=' before any '@' wins.
        (Some(e), a) if a.is_none() || e < a.unwrap() => {
            let (name, content) = v.split_at(e);
            let encoded = urlencode(&content[1..]);
            if name.is_empty() {
                Ok(encoded)
            } else {
                Ok(format!("{name}={encoded}"))
            }
        }
        // `@file` or `name@file`.
        (_, Some(a)) => {
            let (name, path) = v.split_at(a);
            let contents = read_data_file(&path[1..])?;
            let encoded = urlencode(&contents);
            if name.is_empty() {
                Ok(encoded)
            } else {
                Ok(format!("{name}={encoded}"))
            }
        }
        // Bare `content`.
        _ => Ok(urlencode(v)),
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn read_data_file(path: &str) -> Result<String> {
    let meta = std::fs::metadata(path)
        .map_err(|e| crate::error::io_context(e, &format!("reading '{path}'")))?;
    if meta.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{path}' is a directory"),
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| crate::error::io_context(e, &format!("reading '{path}'")))
}

// -- SigV4 scope --------------------------------------------------------------

/// Parse the `--aws-sigv4` scope argument.
///
/// Accepted forms: `REGION/SERVICE`, or curl's `provider:signer:REGION:SERVICE`
/// (`aws:amz:us-east-1:s3`); the provider/signer prefix is ignored with a
/// warning.
pub fn parse_sigv4_scope(spec: &str) -> Result<(String, String)> {
    let (region, service) = if spec.contains(':') {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() < 4 {
            return Err(Error::Cli(format!(
                "invalid --aws-sigv4 value '{spec}': expected REGION/SERVICE or aws:amz:REGION:SERVICE"
            )));
        }
        log::warn!(
            "ignoring signature provider prefix '{}' in --aws-sigv4",
            parts[..parts.len() - 2].join(":")
        );
        (parts[parts.len() - 2], parts[parts.len() - 1])
    } else if let Some((region, service)) = spec.split_once('/') {
        (region, service)
    } else {
        return Err(Error::Cli(format!(
            "invalid --aws-sigv4 value '{spec}': expected REGION/SERVICE"
        )));
    };

    if region.is_empty() || service.is_empty() {
        return Err(Error::Cli(format!(
            "invalid --aws-sigv4 value '{spec}': region and service must be non-empty"
        )));
    }
    Ok((region.to_string(), service.to_string()))
}
