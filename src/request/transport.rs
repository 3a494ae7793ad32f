//! HTTP transport: the single seam through which requests leave the process.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::error::Error;
use crate::user_agent;

/// Sends one request and returns the response headers with a streaming body.
///
/// Implementations report timeouts as [`Error::Timeout`] and connection
/// failures as [`Error::Network`] so the execution loop can retry them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, Error>;
}

/// Client construction settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Keep cookies set by responses and send them back.
    pub cookie_store: bool,
    /// Explicit proxy URL for all schemes; otherwise proxies come from the
    /// environment.
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            cookie_store: false,
            proxy: None,
            user_agent: user_agent::default_user_agent().to_string(),
        }
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the proxy URL is invalid or the client
    /// cannot be built.
    #[instrument(level = "debug")]
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let client = build_client(config)?;
        Ok(Self { client })
    }
}

impl From<Client> for HttpTransport {
    fn from(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, Error> {
        let url = request.url().to_string();
        debug!(method = %request.method(), url = %url, "sending request");
        self.client
            .execute(request)
            .await
            .map_err(|e| Error::from_reqwest(url, e))
    }
}

static DEFAULT_TRANSPORT: OnceLock<Arc<dyn Transport>> = OnceLock::new();

/// The shared transport used when a request does not set one.
///
/// # Errors
///
/// Returns [`Error::Config`] if the default client cannot be built.
pub fn default_transport() -> Result<Arc<dyn Transport>, Error> {
    if let Some(transport) = DEFAULT_TRANSPORT.get() {
        return Ok(Arc::clone(transport));
    }
    let built: Arc<dyn Transport> = Arc::new(HttpTransport::new(&ClientConfig::default())?);
    Ok(Arc::clone(DEFAULT_TRANSPORT.get_or_init(|| built)))
}

fn build_client(config: &ClientConfig) -> Result<Client, Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.read_timeout)
        .user_agent(config.user_agent.as_str())
        .cookie_store(config.cookie_store);

    builder = match &config.proxy {
        Some(proxy) => {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::config(format!("invalid proxy {proxy:?}: {e}")))?;
            builder.proxy(proxy)
        }
        None => apply_env_proxy_fallback(builder.no_proxy()),
    };

    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https") {
        match Proxy::https(&proxy) {
            Ok(resolved) => builder = builder.proxy(resolved),
            Err(e) => warn!(proxy = %proxy, error = %e, "ignoring invalid HTTPS proxy"),
        }
    }
    if let Some(proxy) = env_proxy_for_scheme("http") {
        match Proxy::http(&proxy) {
            Ok(resolved) => builder = builder.proxy(resolved),
            Err(e) => warn!(proxy = %proxy, error = %e, "ignoring invalid HTTP proxy"),
        }
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
