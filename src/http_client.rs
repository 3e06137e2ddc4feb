use anyhow::Result;
use http::Method;
use std::collections::HashMap;
use std::time::Duration;

/// A very simple version that only holds response data
#[derive(Debug, Clone)]
pub struct SimpleHttpResponse {
    /// HTTP status code
    status_code: u16,
    /// Response body
    body: String,
    /// Response headers (lowercase names)
    headers: HashMap<String, String>,
}

impl SimpleHttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status_code: status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key: String = key.into();
        self.headers.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// Get a reference to the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Look up a response header
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Get the body as text (consumes the response)
    pub fn text(self) -> String {
        self.body
    }

    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Check if successful (2xx status)
    pub fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}

/// Trait for HTTP transport, allowing for mocking
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform an HTTP request and return a SimpleHttpResponse.
    ///
    /// Only transport failures are errors; any status code is a response.
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<SimpleHttpResponse>;

    /// Perform HTTP GET request
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<SimpleHttpResponse> {
        self.send(Method::GET, url, headers, None).await
    }

    /// Perform HTTP POST request
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: String,
    ) -> Result<SimpleHttpResponse> {
        self.send(Method::POST, url, headers, Some(body)).await
    }
}

/// Implementation of HttpClient using reqwest
pub struct ReqwestHttpClient {
    /// Internal reqwest client
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create a new client with custom configuration
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<SimpleHttpResponse> {
        let mut request = self.client.request(method, url);

        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;

        let result = response_headers
            .into_iter()
            .fold(SimpleHttpResponse::new(status, body), |resp, (k, v)| {
                resp.with_header(k, v)
            });

        Ok(result)
    }
}
