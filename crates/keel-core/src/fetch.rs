use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("response body for {url} is not JSON: {message}")]
    Body { url: String, message: String },
}

/// A fetched HTTP response, already buffered.
///
/// Mirrors the narrow surface the caches need: a status, an ok-ness check,
/// and a JSON body. Everything else (timeouts, redirects, retries) is the
/// fetcher implementation's business.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    status: u16,
    body: Option<Value>,
}

impl FetchResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// Convenience constructor for a 200 response carrying `body`.
    pub fn json_ok(body: Value) -> Self {
        Self::new(200, Some(body))
    }

    pub fn not_found() -> Self {
        Self::new(404, None)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self, url: &str) -> Result<Value, FetchError> {
        match &self.body {
            Some(value) => Ok(value.clone()),
            None => Err(FetchError::Body {
                url: url.to_string(),
                message: "empty body".to_string(),
            }),
        }
    }
}

/// HTTP boundary used by every cache in this workspace.
///
/// Implementations must be substitutable in tests; the caches only ever
/// degrade on fetch failure, they never propagate it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

// Shared fetchers are fetchers, so test doubles can be kept by the test and
// handed to a cache at the same time.
#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        (**self).fetch(url).await
    }
}

/// Production fetcher backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|err| FetchError::Network {
                    url: url.to_string(),
                    message: err.to_string(),
                })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            // Non-2xx bodies are never inspected by the caches; drop them.
            return Ok(FetchResponse::new(status, None));
        }

        let body: Value = response.json().await.map_err(|err| FetchError::Body {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(FetchResponse::new(status, Some(body)))
    }
}
