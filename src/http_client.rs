//! HTTP transport for the registrar endpoints
//!
//! Features:
//! - Form-encoded POST for the catalog API, query-string GET for downloads
//! - Per-call timeout on top of the configured default
//! - rustls TLS with an opt-in insecure retry for servers that present an
//!   incomplete certificate chain
//! - Non-2xx statuses surfaced as transport errors

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{RegistrarError, Result};

/// Raw 2xx response handed back by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Final URL after redirects.
    pub url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs the two request shapes the registrar needs.
///
/// Implementations must map non-2xx statuses to
/// [`RegistrarError::Transport`] so callers never see an error page as data.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `fields` as `application/x-www-form-urlencoded`.
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse>;

    /// GET `url` with `query` appended as a query string.
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse>;
}

/// `reqwest`-backed [`Transport`].
pub struct HttpTransport {
    client: Client,
    /// Only built when `accept_incomplete_chain` is set.
    insecure: Option<Client>,
}

impl HttpTransport {
    /// Create a transport from the client configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Self::builder(config, false)?;
        let insecure = if config.accept_incomplete_chain {
            Some(Self::builder(config, true)?)
        } else {
            None
        };
        Ok(Self { client, insecure })
    }

    fn builder(config: &ClientConfig, skip_verification: bool) -> Result<Client> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("regi/{}", crate::VERSION));

        Client::builder()
            // Let the server negotiate HTTP/1.1 or HTTP/2
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .danger_accept_invalid_certs(skip_verification)
            .gzip(true)
            .deflate(true)
            .user_agent(user_agent)
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()
            .map_err(|e| RegistrarError::transport("<client>", format!("failed to build HTTP client: {e}")))
    }

    /// Send the request built by `build`, retrying once on the insecure
    /// client when the handshake failed and the fallback is enabled.
    async fn execute<F>(&self, url: &str, build: F) -> Result<TransportResponse>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let response = match build(&self.client).send().await {
            Ok(response) => response,
            Err(e) if is_unknown_issuer(&e) => match &self.insecure {
                Some(insecure) => {
                    warn!(url, error = %e, "Certificate chain incomplete, retrying without certificate validation");
                    build(insecure).send().await.map_err(|e| map_reqwest_error(url, &e))?
                }
                None => return Err(map_reqwest_error(url, &e)),
            },
            Err(e) => return Err(map_reqwest_error(url, &e)),
        };

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        info!(
            status = %status,
            version = ?response.version(),
            url = %final_url,
            "Response received"
        );

        if !status.is_success() {
            return Err(RegistrarError::Transport {
                url: final_url,
                status: Some(status.as_u16()),
                message: format!("server responded with {status}"),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&final_url, &e))?;

        Ok(TransportResponse {
            url: final_url,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, fields), fields(url = %url))]
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse> {
        debug!(fields = fields.len(), "POST form");
        self.execute(url, |client| client.post(url).form(fields).timeout(timeout))
            .await
    }

    #[instrument(skip(self, query), fields(url = %url))]
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse> {
        debug!(params = query.len(), "GET");
        self.execute(url, |client| client.get(url).query(query).timeout(timeout))
            .await
    }
}

fn map_reqwest_error(url: &str, err: &reqwest::Error) -> RegistrarError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", error_chain(err))
    } else {
        error_chain(err)
    };

    RegistrarError::Transport {
        url: url.to_string(),
        status: err.status().map(|s| s.as_u16()),
        message,
    }
}

/// Render an error and all of its sources on one line.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Whether rustls rejected the server certificate because its issuer is
/// unknown, which is how an incomplete chain shows up.
///
/// The rustls error sits inside an `io::Error` somewhere in the source
/// chain. `io::Error::source` skips its payload, so payloads are checked
/// directly.
fn is_unknown_issuer(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let tls = e.downcast_ref::<rustls::Error>().or_else(|| {
            e.downcast_ref::<std::io::Error>()
                .and_then(std::io::Error::get_ref)
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        });
        if matches!(
            tls,
            Some(rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer))
        ) {
            return true;
        }
        current = e.source();
    }
    false
}
