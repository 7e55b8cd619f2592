use std::net::SocketAddr;
use std::sync::Arc;

use crate::dns;
use crate::error::{io_context, Error, Result};
use crate::resolve::{HttpVersion, ResolvedRequest, TlsPolicy, TlsVersion};

/// Build the HTTP client for a resolved request.
///
/// Redirects and response decompression are disabled on the client: the
/// request builder does its own redirect bookkeeping (so it can strip
/// secrets across hosts) and the response pipeline owns decoding.
pub async fn build_client(req: &ResolvedRequest) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(req.connect_timeout);

    if let Some(min) = req.tls.min_version {
        builder = builder.min_tls_version(map_tls_version(min));
    }
    if req.tls.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(cacert) = &req.tls.cacert {
        let pem = std::fs::read(cacert)
            .map_err(|e| io_context(e, &format!("reading CA bundle '{}'", cacert.display())))?;
        for cert in reqwest::Certificate::from_pem_bundle(&pem)
            .map_err(|e| Error::Network(format!("parsing CA bundle '{}': {e}", cacert.display())))?
        {
            builder = builder.add_root_certificate(cert);
        }
    }
    if let Some(cert_path) = &req.tls.cert {
        let key_path = req
            .tls
            .key
            .as_ref()
            .ok_or_else(|| Error::Cli("the --cert option requires --key".into()))?;
        let mut pem = std::fs::read(cert_path)
            .map_err(|e| io_context(e, &format!("reading client cert '{}'", cert_path.display())))?;
        let key = std::fs::read(key_path)
            .map_err(|e| io_context(e, &format!("reading client key '{}'", key_path.display())))?;
        pem.extend_from_slice(&key);
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| Error::Network(format!("loading client identity: {e}")))?;
        builder = builder.identity(identity);
    }

    if let Some(proxy) = &req.proxy {
        builder = builder.proxy(
            reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| Error::Cli(format!("invalid proxy '{proxy}': {e}")))?,
        );
    }

    match req.http_version {
        Some(HttpVersion::One) => builder = builder.http1_only(),
        Some(HttpVersion::Two) => builder = builder.http2_prior_knowledge(),
        Some(HttpVersion::Three) => {
            return Err(Error::Cli(
                "HTTP/3 support is not available in this build".into(),
            ));
        }
        None => {}
    }

    if let Some(server) = req.dns_server {
        builder = apply_dns_override(builder, req, server).await?;
    }

    builder
        .build()
        .map_err(|e| Error::Network(format!("building HTTP client: {e}")))
}

/// Pre-resolve the request host against the user-supplied DNS server and
/// pin the answers into the client resolver.
async fn apply_dns_override(
    builder: reqwest::ClientBuilder,
    req: &ResolvedRequest,
    server: SocketAddr,
) -> Result<reqwest::ClientBuilder> {
    let host = req
        .url
        .host_str()
        .ok_or_else(|| Error::Cli("URL has no host".into()))?;
    if host.parse::<std::net::IpAddr>().is_ok() {
        return Ok(builder);
    }
    let addrs: Vec<SocketAddr> = dns::resolve(host, server)
        .await?
        .into_iter()
        .map(|ip| SocketAddr::new(ip, 0))
        .collect();
    Ok(builder.resolve_to_addrs(host, &addrs))
}

fn map_tls_version(v: TlsVersion) -> reqwest::tls::Version {
    match v {
        TlsVersion::V1_0 => reqwest::tls::Version::TLS_1_0,
        TlsVersion::V1_1 => reqwest::tls::Version::TLS_1_1,
        TlsVersion::V1_2 => reqwest::tls::Version::TLS_1_2,
        TlsVersion::V1_3 => reqwest::tls::Version::TLS_1_3,
    }
}

// -- WebSocket TLS ------------------------------------------------------------

/// Build a rustls client config for the websocket upgrade, honoring the
/// resolved TLS policy (insecure bit, CA bundle, client cert/key).
pub fn build_ws_tls_config(tls: &TlsPolicy) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Network(format!("configuring TLS: {e}")))?;

    let builder = if tls.insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureServerCertVerifier))
    } else {
        let mut root_store = rustls::RootCertStore::empty();
        if let Some(cacert) = &tls.cacert {
            for cert in load_certs(cacert)? {
                root_store
                    .add(cert)
                    .map_err(|e| Error::Network(format!("adding CA certificate: {e}")))?;
            }
        } else {
            let native_certs = rustls_native_certs::load_native_certs();
            for cert in native_certs.certs {
                root_store.add(cert).ok();
            }
        }
        builder.with_root_certificates(root_store)
    };

    let config = if let Some(cert_path) = &tls.cert {
        let key_path = tls
            .key
            .as_ref()
            .ok_or_else(|| Error::Cli("the --cert option requires --key".into()))?;
        let certs = load_certs(cert_path)?;
        let key = load_private_key(key_path)?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| Error::Network(format!("configuring client certificate: {e}")))?
    } else {
        builder.with_no_client_auth()
    };

    Ok(config)
}

fn load_certs(path: &std::path::Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let pem = std::fs::read(path)
        .map_err(|e| io_context(e, &format!("reading certificate '{}'", path.display())))?;
    rustls_pemfile::certs(&mut &*pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Network(format!("parsing certificate '{}': {e}", path.display())))
}

fn load_private_key(path: &std::path::Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let pem = std::fs::read(path)
        .map_err(|e| io_context(e, &format!("reading private key '{}'", path.display())))?;
    rustls_pemfile::private_key(&mut &*pem)
        .map_err(|e| Error::Network(format!("parsing private key '{}': {e}", path.display())))?
        .ok_or_else(|| Error::Cli(format!("no private key found in '{}'", path.display())))
}

/// A certificate verifier that accepts all server certificates without
/// validation.
///
/// WARNING: intentionally insecure; only reachable via the --insecure flag.
#[derive(Debug)]
struct InsecureServerCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
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
    async fn default_client_builds() {
        let req = resolved(|_| {});
        assert!(build_client(&req).await.is_ok());
    }

    #[tokio::test]
    async fn insecure_client_builds() {
        let req = resolved(|raw| raw.insecure = Some(true));
        assert!(build_client(&req).await.is_ok());
    }

    #[tokio::test]
    async fn missing_cacert_fails() {
        let req = resolved(|raw| raw.cacert = Some("/nonexistent/ca.pem".into()));
        assert!(build_client(&req).await.is_err());
    }

    #[tokio::test]
    async fn http3_reports_unsupported() {
        let req = resolved(|raw| raw.http = Some(HttpVersion::Three));
        let err = build_client(&req).await.unwrap_err();
        assert!(err.to_string().contains("HTTP/3"));
    }

    #[test]
    fn insecure_ws_tls_config_builds() {
        let tls = TlsPolicy {
            insecure: true,
            ..Default::default()
        };
        assert!(build_ws_tls_config(&tls).is_ok());
    }

    #[test]
    fn standard_ws_tls_config_builds() {
        let tls = TlsPolicy::default();
        assert!(build_ws_tls_config(&tls).is_ok());
    }
}
