//! HTTP client measuring the phases of each exchange

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::HOST;
use hyper::{HeaderMap, Method, Request, Uri};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::manifest::Headers;
use crate::storage::{CapturedRequest, CapturedResponse, RequestStats};
use crate::{ApiDiffError, Result};

/// Byte stream a request can be written to, plain or TLS
trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
}

/// Resolved destination of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// URL scheme
    pub scheme: Scheme,
    /// Host name or IP literal, without brackets
    pub host: String,
    /// Port, defaulted from the scheme
    pub port: u16,
    /// Parsed URL
    pub uri: Uri,
}

impl Target {
    /// Parse an absolute `http`/`https` URL
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the URL is malformed, relative or uses
    /// another scheme
    pub fn parse(url: &str) -> Result<Self> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| ApiDiffError::Validation(format!("Invalid URL '{url}': {e}")))?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(other) => {
                return Err(ApiDiffError::Validation(format!(
                    "Unsupported scheme '{other}' in URL '{url}'"
                )))
            }
            None => {
                return Err(ApiDiffError::Validation(format!(
                    "URL '{url}' must be absolute"
                )))
            }
        };

        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ApiDiffError::Validation(format!("URL '{url}' has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let port = uri.port_u16().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });

        Ok(Self {
            scheme,
            host,
            port,
            uri,
        })
    }
}

/// Response of a measured exchange
#[derive(Debug, Clone)]
pub struct TimedResponse {
    /// Captured response
    pub response: CapturedResponse,
    /// Per-phase timings
    pub stats: RequestStats,
}

/// HTTP client opening one connection per exchange so that DNS, connect and
/// handshake phases can be timed individually
pub struct TimedClient {
    tls: TlsConnector,
    connect_timeout: Duration,
}

impl TimedClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the TLS configuration cannot be built
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            tls: super::tls::connector()?,
            connect_timeout: config.connect_timeout(),
        })
    }

    /// Check that a request can be sent, without touching the network
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed URL, method or header
    pub fn validate(request: &CapturedRequest) -> Result<()> {
        let target = Target::parse(&request.url)?;
        build_request(request, &target).map(|_| ())
    }

    /// Execute a request and measure it
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the request cannot be built and `Network` if
    /// any phase of the exchange fails. Failed exchanges are not retried.
    pub async fn execute(&self, request: &CapturedRequest) -> Result<TimedResponse> {
        let target = Target::parse(&request.url)?;
        let http_request = build_request(request, &target)?;
        let mut stats = RequestStats::default();

        debug!("Sending {} {}", request.method, request.url);

        let stream = tokio::time::timeout(self.connect_timeout, self.connect(&target, &mut stats))
            .await
            .map_err(|_| {
                ApiDiffError::Network(format!(
                    "Connecting to {}:{} timed out after {:?}",
                    target.host, target.port, self.connect_timeout
                ))
            })??;

        let mut response = exchange(stream, http_request, &mut stats).await?;
        response.duration_ms = stats.duration();

        Ok(TimedResponse { response, stats })
    }

    /// Resolve, connect and (for https) handshake, recording each phase
    async fn connect(
        &self,
        target: &Target,
        stats: &mut RequestStats,
    ) -> Result<Box<dyn Connection>> {
        let started = Instant::now();
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|e| {
                ApiDiffError::Network(format!("DNS lookup for '{}' failed: {e}", target.host))
            })?
            .collect();
        stats.dns_lookup = elapsed_ms(started);

        let started = Instant::now();
        let stream = connect_any(&addrs, target).await?;
        stats.tcp_connection = elapsed_ms(started);

        match target.scheme {
            Scheme::Http => Ok(Box::new(stream)),
            Scheme::Https => {
                let server_name = ServerName::try_from(target.host.as_str())
                    .map(|name| name.to_owned())
                    .map_err(|e| {
                        ApiDiffError::Validation(format!(
                            "Invalid TLS server name '{}': {e}",
                            target.host
                        ))
                    })?;

                let started = Instant::now();
                let tls_stream = self.tls.connect(server_name, stream).await.map_err(|e| {
                    ApiDiffError::Network(format!(
                        "TLS handshake with '{}' failed: {e}",
                        target.host
                    ))
                })?;
                stats.tls_handshake = elapsed_ms(started);

                Ok(Box::new(tls_stream))
            }
        }
    }
}

/// Connect to the first reachable resolved address
async fn connect_any(addrs: &[SocketAddr], target: &Target) -> Result<TcpStream> {
    let mut last_error = None;

    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connect to {addr} failed: {e}");
                last_error = Some(e);
            }
        }
    }

    Err(ApiDiffError::Network(match last_error {
        Some(e) => format!("Connecting to {}:{} failed: {e}", target.host, target.port),
        None => format!("'{}' resolved to no address", target.host),
    }))
}

/// Send the request over an established connection and collect the response
async fn exchange(
    stream: Box<dyn Connection>,
    request: Request<Full<Bytes>>,
    stats: &mut RequestStats,
) -> Result<CapturedResponse> {
    let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ApiDiffError::Network(format!("HTTP handshake failed: {e}")))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("Connection closed with error: {e}");
        }
    });

    let started = Instant::now();
    let response = sender.send_request(request).await.map_err(|e| {
        warn!("Request failed: {e}");
        ApiDiffError::Network(format!("Request failed: {e}"))
    })?;
    stats.server_processing = elapsed_ms(started);

    let (parts, body) = response.into_parts();

    let started = Instant::now();
    let body_bytes = body
        .collect()
        .await
        .map_err(|e| ApiDiffError::Network(format!("Failed to read response body: {e}")))?
        .to_bytes();
    stats.content_transfer = elapsed_ms(started);

    Ok(CapturedResponse {
        status: format!(
            "{} {}",
            parts.status.as_u16(),
            parts.status.canonical_reason().unwrap_or_default()
        )
        .trim_end()
        .to_string(),
        code: parts.status.as_u16(),
        headers: collect_headers(&parts.headers),
        body: String::from_utf8_lossy(&body_bytes).into_owned(),
        duration_ms: 0,
    })
}

/// Build the origin-form HTTP/1.1 request
fn build_request(request: &CapturedRequest, target: &Target) -> Result<Request<Full<Bytes>>> {
    let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
        ApiDiffError::Validation(format!("Invalid HTTP method '{}': {e}", request.method))
    })?;

    let path = target
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());

    let mut builder = Request::builder().method(method).uri(path);

    for (name, values) in &request.headers {
        for value in values {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    if !request.headers.keys().any(|name| name.eq_ignore_ascii_case("host")) {
        if let Some(authority) = target.uri.authority() {
            builder = builder.header(HOST, authority.as_str());
        }
    }

    builder
        .body(Full::new(Bytes::from(request.body.clone())))
        .map_err(|e| ApiDiffError::Validation(format!("Failed to build request: {e}")))
}

fn collect_headers(headers: &HeaderMap) -> Headers {
    let mut collected = Headers::new();
    for (name, value) in headers {
        collected
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    collected
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
