//! HTTP Client
//!
//! Uses hyper with tokio for async HTTP/1.1.
//! Features:
//! - Automatic HTTPS with rustls (memory-safe TLS)
//! - Optional SOCKS5 egress so lookups leave through the user's proxy
//! - Bounded response bodies
//!
//! The [`Fetch`] trait is the seam the rest of the workspace codes
//! against; tests substitute scripted transports for [`HttpClient`].

use crate::socks::{self, SocksError};
use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use rustls::ClientConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Proxy handshake failed: {0}")]
    Proxy(#[from] SocksError),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Body read error: {0}")]
    BodyError(String),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout (TCP + proxy handshake + TLS)
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
    /// Route every connection through this SOCKS5 proxy
    pub socks_proxy: Option<SocketAddr>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: "fOS-WB/0.1 (Zero-Bloat Browser)".to_string(),
            max_body_size: 1024 * 1024, // 1 MB, lookup answers are tiny
            socks_proxy: None,
        }
    }
}

impl HttpClientConfig {
    /// Same defaults, egressing through a SOCKS5 proxy
    pub fn via_socks(proxy: SocketAddr) -> Self {
        Self {
            socks_proxy: Some(proxy),
            ..Self::default()
        }
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
    /// Total request time
    pub total_time: Duration,
    /// Requested URL
    pub final_url: String,
}

impl Response {
    /// Build a response without headers (used by scripted transports)
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>, url: &str) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            total_time: Duration::ZERO,
            final_url: url.to_string(),
        }
    }

    /// Check if response was successful (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get body as string
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }

    /// Get Content-Type header
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

/// Anything able to perform a single HTTP exchange.
pub trait Fetch: Send + Sync + 'static {
    /// Perform `method` against `url` and return the buffered response.
    fn fetch(
        &self,
        method: Method,
        url: &str,
    ) -> impl Future<Output = Result<Response, HttpError>> + Send;
}

/// Client statistics
#[derive(Debug, Default)]
pub struct ClientStats {
    pub requests_made: AtomicU64,
    pub requests_failed: AtomicU64,
    pub bytes_downloaded: AtomicU64,
}

/// HTTP client
pub struct HttpClient {
    /// Configuration
    config: HttpClientConfig,
    /// Shared TLS configuration
    tls: Arc<ClientConfig>,
    /// Statistics
    stats: ClientStats,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        info!(
            "HTTP client initialized (connect timeout: {:?}, proxy: {})",
            config.connect_timeout,
            config
                .socks_proxy
                .map(|p| format!("socks5://{}", p))
                .unwrap_or_else(|| "direct".to_string())
        );

        Self {
            config,
            tls: Arc::new(tls),
            stats: ClientStats::default(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Perform a GET request
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.request(Method::GET, url).await
    }

    /// Perform a HEAD request
    pub async fn head(&self, url: &str) -> Result<Response, HttpError> {
        self.request(Method::HEAD, url).await
    }

    /// Perform an HTTP request with an empty body
    pub async fn request(&self, method: Method, url: &str) -> Result<Response, HttpError> {
        self.stats.requests_made.fetch_add(1, Ordering::Relaxed);

        let result = self.exchange(method, url).await;
        match &result {
            Ok(response) => {
                self.stats
                    .bytes_downloaded
                    .fetch_add(response.body.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                debug!("HTTP {} failed: {}", url, e);
            }
        }
        result
    }

    async fn exchange(&self, method: Method, url: &str) -> Result<Response, HttpError> {
        let start = Instant::now();

        // 1. Parse URL
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| HttpError::InvalidUrl(e.to_string()))?;

        let host = uri
            .host()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?
            .to_string();
        let is_https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(HttpError::InvalidUrl(format!(
                    "Unsupported scheme: {}",
                    other.unwrap_or("none")
                )))
            }
        };
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });
        let path = uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/")
            .to_string();

        // 2. Build request (origin-form target, explicit Host)
        let request = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(HOST, &host)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .body(Empty::<Bytes>::new())
            .map_err(|e| HttpError::HttpError(e.to_string()))?;

        // 3. Connect, optionally through the proxy
        let stream = tokio::time::timeout(self.config.connect_timeout, self.connect(&host, port))
            .await
            .map_err(|_| HttpError::Timeout)??;

        // 4. Send request, wrapping in TLS when needed
        let response = if is_https {
            let connector = TlsConnector::from(self.tls.clone());
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| HttpError::TlsError("Invalid server name".to_string()))?;

            let tls_stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| HttpError::TlsError(e.to_string()))?;

            let io = hyper_util::rt::TokioIo::new(tls_stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| HttpError::HttpError(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender.send_request(request).await
        } else {
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| HttpError::HttpError(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender.send_request(request).await
        }
        .map_err(|e| HttpError::HttpError(e.to_string()))?;

        // 5. Read response with size limit
        let status = response.status();
        let headers = response.headers().clone();

        let limited = Limited::new(response.into_body(), self.config.max_body_size);
        let collected = limited
            .collect()
            .await
            .map_err(|e| HttpError::BodyError(e.to_string()))?;
        let body = collected.to_bytes().to_vec();

        debug!(
            "HTTP {} {} -> {} ({} bytes, {:?})",
            method,
            url,
            status,
            body.len(),
            start.elapsed()
        );

        Ok(Response {
            status,
            headers,
            body,
            total_time: start.elapsed(),
            final_url: url.to_string(),
        })
    }

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, HttpError> {
        match self.config.socks_proxy {
            Some(proxy) => Ok(socks::connect(proxy, host, port).await?),
            None => TcpStream::connect((host, port))
                .await
                .map_err(|e| HttpError::ConnectionFailed(e.to_string())),
        }
    }

    /// Get client statistics (made, failed, bytes)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.requests_made.load(Ordering::Relaxed),
            self.stats.requests_failed.load(Ordering::Relaxed),
            self.stats.bytes_downloaded.load(Ordering::Relaxed),
        )
    }
}

impl Fetch for HttpClient {
    fn fetch(
        &self,
        method: Method,
        url: &str,
    ) -> impl Future<Output = Result<Response, HttpError>> + Send {
        self.request(method, url)
    }
}
