use std::fmt;
use std::str::FromStr;

use clap::{ArgAction, Parser};

use fetch_core::printer::ColorMode;
use fetch_core::resolve::{FormatMode, HttpVersion, RawFlags, TlsVersion};

/// Shells with completion support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionShell {
    Bash,
    Fish,
    Zsh,
}

impl FromStr for CompletionShell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(CompletionShell::Bash),
            "fish" => Ok(CompletionShell::Fish),
            "zsh" => Ok(CompletionShell::Zsh),
            other => Err(format!(
                "The --complete option must be 'bash', 'fish', or 'zsh', got '{other}'."
            )),
        }
    }
}

impl fmt::Display for CompletionShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionShell::Bash => write!(f, "bash"),
            CompletionShell::Fish => write!(f, "fish"),
            CompletionShell::Zsh => write!(f, "zsh"),
        }
    }
}

/// fetch is a modern, high-level HTTP(S) client for the command line.
///
/// Provide a URL (the scheme is inferred when omitted) and fetch issues
/// the request, streams the response, and renders it with type-aware
/// formatting. ws:// and wss:// URLs open an interactive websocket
/// session.
#[derive(Parser, Debug)]
#[command(
    name = "fetch",
    version,
    after_help = "Example usage:\n  \
        fetch example.com\n  \
        fetch -m PUT --json --data '{\"a\":1}' api.example.com/items/1\n  \
        fetch --from-curl \"curl -X POST -d 'k=v' https://api.example.com\"\n  \
        fetch wss://echo.example.com"
)]
pub struct Cli {
    /// The URL to request.
    pub url: Option<String>,

    // -- Request --
    /// HTTP method to use (default: GET, or POST with a body).
    #[arg(short = 'm', long, short_alias = 'X', value_name = "METHOD")]
    pub method: Option<String>,

    /// Additional header in 'Name: value' format. May be repeated.
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub header: Vec<String>,

    /// Query parameter in 'key=value' format, appended after any query
    /// already present in the URL. May be repeated.
    #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Request body. '@FILE' streams the file, '@-' reads stdin.
    #[arg(short = 'd', long, value_name = "[@]VALUE")]
    pub data: Option<String>,

    /// URL-encoded form field in 'key=value' format. May be repeated.
    #[arg(short = 'f', long = "form", value_name = "KEY=VALUE")]
    pub form: Vec<String>,

    /// Multipart form field: 'name=value' or 'name=@path'. May be repeated.
    #[arg(short = 'F', long = "multipart", value_name = "NAME=[@]VALUE")]
    pub multipart: Vec<String>,

    /// Treat the body as JSON: sets the Content-Type and Accept headers.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Treat the body as XML: sets the Content-Type header.
    #[arg(short = 'x', long)]
    pub xml: bool,

    /// Compose the request body in $EDITOR. Requires --json or --xml.
    #[arg(short = 'e', long)]
    pub edit: bool,

    // -- Authentication --
    /// Basic authentication credentials as 'USER:PASS'.
    #[arg(long, value_name = "USER:PASS")]
    pub basic: Option<String>,

    /// Bearer token for the Authorization header.
    #[arg(long, value_name = "TOKEN")]
    pub bearer: Option<String>,

    /// Sign the request with AWS Signature V4. Requires the
    /// AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.
    #[arg(long, value_name = "REGION/SERVICE")]
    pub aws_sigv4: Option<String>,

    // -- Connection --
    /// Preferred HTTP version.
    #[arg(long, value_name = "1|2|3")]
    pub http: Option<HttpVersion>,

    /// Minimum accepted TLS version.
    #[arg(long, value_name = "1.0|1.1|1.2|1.3")]
    pub tls: Option<TlsVersion>,

    /// Skip server certificate verification. (NOT SECURE!)
    #[arg(long)]
    pub insecure: bool,

    /// File containing additional trusted root certificates (PEM).
    #[arg(long, value_name = "FILE")]
    pub cacert: Option<String>,

    /// Client certificate for mutual TLS (PEM). Requires --key.
    #[arg(long, value_name = "FILE")]
    pub cert: Option<String>,

    /// Client private key for mutual TLS (PEM). Requires --cert.
    #[arg(long, value_name = "FILE")]
    pub key: Option<String>,

    /// Overall request timeout in seconds (connect + body).
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Connection timeout in seconds. Defaults to 10.
    #[arg(long, value_name = "SECONDS")]
    pub connect_timeout: Option<f64>,

    /// Maximum redirects to follow; 0 disables following. Defaults to 10.
    #[arg(long, value_name = "COUNT")]
    pub redirects: Option<u32>,

    /// Retries for transport failures and 5xx responses.
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Proxy URL (http, https, or socks5).
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// DNS server to resolve the host against, as IP[:PORT].
    #[arg(long, value_name = "IP[:PORT]")]
    pub dns_server: Option<String>,

    // -- Output --
    /// Write the response body to a file ('-' for raw stdout).
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<String>,

    /// When to colorize output.
    #[arg(long, value_name = "auto|off|on")]
    pub color: Option<ColorMode>,

    /// When to apply content-type-aware formatting.
    #[arg(long, value_name = "auto|off|on")]
    pub format: Option<FormatMode>,

    /// Suppress status, header, and progress output.
    #[arg(short = 's', long)]
    pub silent: bool,

    /// Increase verbosity: status line, response headers, request headers.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Exit 0 even for non-2xx responses.
    #[arg(long)]
    pub ignore_status: bool,

    /// Do not advertise accept-encoding (response stays uncompressed).
    #[arg(long)]
    pub no_encode: bool,

    /// Never pipe output through a pager.
    #[arg(long)]
    pub no_pager: bool,

    /// Print the prepared request instead of sending it.
    #[arg(long)]
    pub dry_run: bool,

    // -- Protobuf schemas --
    /// Proto source file for decoding protobuf responses. May be repeated.
    #[arg(long, value_name = "FILE")]
    pub proto_file: Vec<String>,

    /// Encoded FileDescriptorSet for decoding protobuf responses.
    #[arg(long, value_name = "FILE")]
    pub proto_desc: Option<String>,

    /// Fully-qualified message name for protobuf responses.
    #[arg(long, value_name = "NAME")]
    pub proto_message: Option<String>,

    // -- Alternate modes --
    /// Translate and merge a curl command line.
    #[arg(long, value_name = "CMD")]
    pub from_curl: Option<String>,

    /// Update fetch to the latest release and exit.
    #[arg(long)]
    pub update: bool,

    /// Print shell completions and exit.
    #[arg(long, value_name = "bash|fish|zsh")]
    pub complete: Option<CompletionShell>,

    /// Path to the config file (default: <config-dir>/fetch/config).
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,
}

impl Cli {
    /// Lower the parsed arguments into the framework-independent flag
    /// record consumed by the resolver.
    pub fn to_raw_flags(&self) -> RawFlags {
        RawFlags {
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.header.clone(),
            query: self.query.clone(),
            data: self.data.clone(),
            form: self.form.clone(),
            multipart: self.multipart.clone(),
            json: self.json,
            xml: self.xml,
            edit: self.edit,
            basic: self.basic.clone(),
            bearer: self.bearer.clone(),
            aws_sigv4: self.aws_sigv4.clone(),
            color: self.color,
            format: self.format,
            http: self.http,
            tls: self.tls,
            insecure: self.insecure.then_some(true),
            cacert: self.cacert.clone(),
            cert: self.cert.clone(),
            key: self.key.clone(),
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            redirects: self.redirects,
            retries: self.retries,
            proxy: self.proxy.clone(),
            dns_server: self.dns_server.clone(),
            output: self.output.clone(),
            silent: self.silent,
            verbose: self.verbose,
            ignore_status: self.ignore_status,
            no_encode: self.no_encode,
            no_pager: self.no_pager.then_some(true),
            dry_run: self.dry_run,
            proto_file: self.proto_file.clone(),
            proto_desc: self.proto_desc.clone(),
            proto_message: self.proto_message.clone(),
            auto_update: None,
            from_curl: self.from_curl.clone(),
            config: self.config.clone(),
        }
    }
}
