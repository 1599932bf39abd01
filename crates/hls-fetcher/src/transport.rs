// Network capability consumed by the engine, with a reqwest-backed default.

use crate::config::HttpConfig;
use crate::error::HlsError;
use crate::retry::is_retryable_reqwest_error;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use tracing::{debug, trace};
use url::Url;

/// Fetches playlist and segment bodies.
///
/// Implementations own timeouts, headers and cookies. Errors should be
/// classified so that [`HlsError::is_retryable`] is meaningful.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_playlist(&self, url: &Url) -> Result<Bytes, HlsError>;

    async fn fetch_segment(&self, url: &Url) -> Result<Bytes, HlsError>;
}

/// [`Transport`] over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, HlsError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| HlsError::configuration(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, user_agent);
        if let Some(referer) = &config.referer {
            let referer = HeaderValue::from_str(referer)
                .map_err(|e| HlsError::configuration(format!("invalid referer: {e}")))?;
            headers.insert(REFERER, referer);
        }
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                HlsError::configuration(format!("invalid header name `{name}`: {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                HlsError::configuration(format!("invalid value for header `{name}`: {e}"))
            })?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(config.persist_cookies)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HlsError::configuration(format!("failed to build HTTP client: {e}")))?;

        debug!(
            persist_cookies = config.persist_cookies,
            extra_headers = config.headers.len(),
            "HTTP transport ready"
        );
        Ok(Self { client })
    }

    /// Wraps an existing client as is.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &Url) -> Result<Bytes, HlsError> {
        trace!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HlsError::http(status, url.as_str()));
        }

        response.bytes().await.map_err(|e| transport_error(url, &e))
    }
}

fn transport_error(url: &Url, err: &reqwest::Error) -> HlsError {
    HlsError::transport(url.as_str(), err.to_string(), is_retryable_reqwest_error(err))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_playlist(&self, url: &Url) -> Result<Bytes, HlsError> {
        self.get(url).await
    }

    async fn fetch_segment(&self, url: &Url) -> Result<Bytes, HlsError> {
        self.get(url).await
    }
}
