pub mod body;
pub mod multipart;
pub mod sigv4;

use std::time::{Duration, Instant};

use base64::Engine as _;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::printer::Printer;
use crate::resolve::{Auth, BodySource, KeyVal, ResolvedRequest};
use crate::transport;

/// Ceiling for exponential retry backoff.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// The accept-encoding value advertised unless --no-encode is set.
pub const ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";

/// Overall deadline for the request plus body read.
///
/// The builder consumes part of the budget; the response pipeline drains the
/// rest while streaming the body.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Deadline {
        Deadline {
            start: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Remaining budget, or an immediate `Timeout` error if expired.
    pub fn remaining(&self) -> Result<Option<Duration>> {
        match self.limit {
            None => Ok(None),
            Some(limit) => {
                let elapsed = self.start.elapsed();
                if elapsed >= limit {
                    Err(Error::Timeout(elapsed))
                } else {
                    Ok(Some(limit - elapsed))
                }
            }
        }
    }

    /// Run a future against the deadline and the cancellation token.
    pub async fn run<F, T>(&self, cancel: &CancellationToken, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match self.remaining()? {
            None => {
                tokio::select! {
                    out = fut => out,
                    () = cancel.cancelled() => Err(Error::Signal(signal_name())),
                }
            }
            Some(remaining) => {
                tokio::select! {
                    out = fut => out,
                    () = cancel.cancelled() => Err(Error::Signal(signal_name())),
                    () = tokio::time::sleep(remaining) => Err(Error::Timeout(self.elapsed())),
                }
            }
        }
    }
}

fn signal_name() -> &'static str {
    crate::signal::last_signal_name().unwrap_or("SIGINT")
}

/// The outcome of request execution: the streaming response, the headers
/// that were sent (for verbose rendering), and the remaining deadline.
pub struct Outcome {
    pub response: reqwest::Response,
    pub sent_headers: Vec<KeyVal>,
    pub deadline: Deadline,
}

/// Execute a resolved request: build the client, prepare per-attempt
/// requests, and run the retry and redirect policies.
pub async fn execute(req: &ResolvedRequest, cancel: &CancellationToken) -> Result<Outcome> {
    let client = transport::build_client(req).await?;
    let deadline = Deadline::new(req.timeout);
    let url = url_with_query(req);

    let mut stdin_cache: Option<Vec<u8>> = None;
    let mut attempt: u32 = 0;

    loop {
        let result = single_exchange(req, &client, &url, cancel, &deadline, &mut stdin_cache).await;

        let retryable = match &result {
            Ok(outcome) => outcome.response.status().is_server_error(),
            Err(Error::Network(_)) => true,
            Err(_) => false,
        };

        if retryable && attempt < req.retries {
            let delay = req
                .retry_base
                .checked_mul(1 << attempt.min(16))
                .unwrap_or(MAX_RETRY_DELAY)
                .min(MAX_RETRY_DELAY);
            log::debug!("attempt {} failed; retrying in {:?}", attempt + 1, delay);
            attempt += 1;
            deadline
                .run(cancel, async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
            continue;
        }

        return result;
    }
}

/// One attempt: send the request and follow redirects up to the cap.
async fn single_exchange(
    req: &ResolvedRequest,
    client: &reqwest::Client,
    url: &Url,
    cancel: &CancellationToken,
    deadline: &Deadline,
    stdin_cache: &mut Option<Vec<u8>>,
) -> Result<Outcome> {
    let mut current_url = url.clone();
    let mut method = req.method.clone();
    let mut auth_dropped = false;
    let mut send_body = true;
    let mut hops: u32 = 0;

    loop {
        let prepared = prepare_attempt(
            req,
            &current_url,
            &method,
            auth_dropped,
            send_body,
            stdin_cache,
        )
        .await?;

        let mut builder = client.request(method.clone(), current_url.clone());
        builder = builder.headers(to_header_map(&prepared.headers)?);
        if let Some(body) = prepared.body {
            builder = builder.body(body);
        }
        let request = builder.build()?;

        let response = deadline
            .run(cancel, async { Ok(client.execute(request).await?) })
            .await?;

        let status = response.status();
        if status.is_redirection() && req.redirects > 0 {
            if hops >= req.redirects {
                log::warn!("redirect cap of {} reached; rendering last response", req.redirects);
                return Ok(Outcome {
                    response,
                    sent_headers: prepared.headers,
                    deadline: *deadline,
                });
            }
            if let Some(location) = response.headers().get(http::header::LOCATION) {
                let location = location
                    .to_str()
                    .map_err(|_| Error::Network("redirect location is not valid UTF-8".into()))?;
                let next_url = current_url.join(location).map_err(|e| {
                    Error::Network(format!("invalid redirect location '{location}': {e}"))
                })?;

                // Method rewriting per common HTTP semantics: 301/302/303
                // become GET with the body dropped; 307/308 preserve both.
                if matches!(status.as_u16(), 301 | 302 | 303) && method != http::Method::HEAD {
                    method = http::Method::GET;
                    send_body = false;
                }

                // Drop credentials when the redirect leaves the host.
                if next_url.host_str() != current_url.host_str() {
                    auth_dropped = true;
                }

                log::debug!("following {status} redirect to {next_url}");
                current_url = next_url;
                hops += 1;
                continue;
            }
        }

        return Ok(Outcome {
            response,
            sent_headers: prepared.headers,
            deadline: *deadline,
        });
    }
}

struct PreparedAttempt {
    headers: Vec<KeyVal>,
    body: Option<reqwest::Body>,
}

/// Prepare headers and body for one attempt. Re-invoked per retry and per
/// redirect hop so timestamps and signatures are fresh and streaming bodies
/// are re-opened.
async fn prepare_attempt(
    req: &ResolvedRequest,
    url: &Url,
    method: &http::Method,
    auth_dropped: bool,
    send_body: bool,
    stdin_cache: &mut Option<Vec<u8>>,
) -> Result<PreparedAttempt> {
    let prepared_body = if send_body {
        body::prepare(req, stdin_cache).await?
    } else {
        body::PreparedBody {
            body: None,
            content_type: None,
            bytes: None,
        }
    };

    let mut headers: Vec<KeyVal> = Vec::new();
    let user_has = |name: &str| {
        req.headers
            .iter()
            .any(|kv| kv.key.eq_ignore_ascii_case(name))
            // Secret-bearing user headers are dropped on cross-host hops.
            && !(auth_dropped && is_secret_header(name))
    };

    if !user_has("user-agent") {
        headers.push(KeyVal::new(
            "user-agent",
            format!("fetch/{}", env!("CARGO_PKG_VERSION")),
        ));
    }
    if req.force_json && !user_has("accept") {
        headers.push(KeyVal::new("accept", "application/json"));
    }
    if !req.no_encode && !user_has("accept-encoding") {
        headers.push(KeyVal::new("accept-encoding", ACCEPT_ENCODING));
    }
    if let Some(content_type) = &prepared_body.content_type {
        if !user_has("content-type") {
            headers.push(KeyVal::new("content-type", content_type.clone()));
        }
    }

    // Authentication. Credentials are withheld entirely after a cross-host
    // redirect.
    if !auth_dropped {
        match &req.auth {
            Auth::None => {}
            Auth::Basic(userpass) => {
                if !user_has("authorization") {
                    let encoded =
                        base64::engine::general_purpose::STANDARD.encode(userpass.as_bytes());
                    headers.push(KeyVal::new("authorization", format!("Basic {encoded}")));
                }
            }
            Auth::Bearer(token) => {
                if !user_has("authorization") {
                    headers.push(KeyVal::new("authorization", format!("Bearer {token}")));
                }
            }
            Auth::AwsSigv4 {
                region,
                service,
                access_key,
                secret_key,
            } => {
                let payload = match &prepared_body.bytes {
                    Some(bytes) => sigv4::Payload::Bytes(bytes),
                    None if matches!(req.body, BodySource::None) || !send_body => {
                        sigv4::Payload::Bytes(b"")
                    }
                    None => sigv4::Payload::Unsigned,
                };
                let creds = sigv4::Credentials {
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                    region: region.clone(),
                    service: service.clone(),
                };
                let signed =
                    sigv4::sign(method, url, &creds, payload, time::OffsetDateTime::now_utc())?;
                headers.push(KeyVal::new("x-amz-date", signed.amz_date));
                headers.push(KeyVal::new("x-amz-content-sha256", signed.content_sha256));
                headers.push(KeyVal::new("authorization", signed.authorization));
            }
        }
    }

    // User headers last, in the order given; they override anything
    // synthesized above (which was skipped when the name collided).
    for kv in &req.headers {
        if auth_dropped && is_secret_header(&kv.key) {
            continue;
        }
        headers.push(kv.clone());
    }

    Ok(PreparedAttempt {
        headers,
        body: prepared_body.body,
    })
}

fn is_secret_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("cookie")
}

/// The final URL with --query pairs appended after any existing query.
pub fn url_with_query(req: &ResolvedRequest) -> Url {
    let mut url = req.url.clone();
    if !req.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for kv in &req.query {
            pairs.append_pair(&kv.key, &kv.value);
        }
        drop(pairs);
    }
    url
}

fn to_header_map(headers: &[KeyVal]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for kv in headers {
        let name = HeaderName::from_bytes(kv.key.as_bytes())
            .map_err(|_| Error::Cli(format!("invalid header name '{}'", kv.key)))?;
        let value = HeaderValue::from_str(&kv.value)
            .map_err(|_| Error::Cli(format!("invalid value for header '{}'", kv.key)))?;
        map.append(name, value);
    }
    Ok(map)
}

// -- Dry run ------------------------------------------------------------------

/// Render the canonical form of the prepared request without any network
/// I/O: method and URL, headers in send order, then the body source.
pub async fn render_dry_run(req: &ResolvedRequest, p: &mut Printer) -> Result<()> {
    let url = url_with_query(req);
    let mut stdin_cache = None;
    let prepared = prepare_attempt(req, &url, &req.method, false, true, &mut stdin_cache).await?;

    p.write_str(&format!("{} {}\n", req.method, url));
    for kv in &prepared.headers {
        p.write_str(&format!("{}: {}\n", kv.key.to_ascii_lowercase(), kv.value));
    }
    p.write_str(&format!("body: {}\n", req.body.describe()));
    p.flush()?;
    Ok(())
}
