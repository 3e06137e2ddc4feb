//! Authenticated client for the Kirkidata REST API.
//!
//! Every call goes through [`ApiClient::request_with`], which attaches the
//! role's bearer token, classifies the response, and on a first 401 runs
//! one refresh-and-retry cycle.

mod refresh;
mod request;
mod response;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::{Role, Sessions};
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::http_client::{HttpClient, ReqwestHttpClient};

pub use refresh::REFRESH_ENDPOINT;
pub use request::RequestOptions;
pub use response::ApiEnvelope;

use refresh::InFlightRefresh;

/// Retry policy for the refresh call itself
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefreshPolicy {
    pub max_attempts: usize,
    pub backoff_ms: u64,
}

struct ClientInner {
    base_url: String,
    http: Arc<dyn HttpClient>,
    sessions: Sessions,
    refresh_policy: RefreshPolicy,
    /// One shared refresh per role while it is running
    in_flight: Mutex<HashMap<Role, InFlightRefresh>>,
    /// Access tokens recently replaced by a refresh, per role
    superseded: Mutex<HashMap<Role, VecDeque<String>>>,
}

/// HTTP client that attaches session credentials and recovers expired ones.
///
/// Cheap to clone; clones share sessions and in-flight refreshes.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Create a client over an explicit transport
    pub fn new(
        config: &ClientConfig,
        http: Arc<dyn HttpClient>,
        sessions: Sessions,
    ) -> ApiResult<Self> {
        config
            .validate()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: config.base_url().to_string(),
                http,
                sessions,
                refresh_policy: RefreshPolicy {
                    max_attempts: config.refresh_max_attempts,
                    backoff_ms: config.refresh_backoff_ms,
                },
                in_flight: Mutex::new(HashMap::new()),
                superseded: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Create a client over reqwest, honouring the configured timeout
    pub fn from_config(config: &ClientConfig, sessions: Sessions) -> ApiResult<Self> {
        let http = match config.request_timeout() {
            Some(timeout) => ReqwestHttpClient::with_timeout(timeout)
                .map_err(|e| ApiError::Config(e.to_string()))?,
            None => ReqwestHttpClient::new(),
        };
        Self::new(config, Arc::new(http), sessions)
    }

    pub fn sessions(&self) -> &Sessions {
        &self.inner.sessions
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Absolute URL of an endpoint
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.inner.base_url, endpoint.trim_start_matches('/'))
    }

    /// Perform a call and decode the body into `T`
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let (status, body) = self.execute(endpoint, options, false).await?;
        serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse {
            status,
            reason: e.to_string(),
        })
    }

    /// Perform a call and return the JSON body unmodified
    pub async fn request_value(&self, endpoint: &str, options: RequestOptions) -> ApiResult<Value> {
        self.request_with(endpoint, options, false).await
    }

    /// Perform a call. With `is_retry` set a 401 is surfaced as-is and
    /// never triggers a refresh.
    pub async fn request_with(
        &self,
        endpoint: &str,
        options: RequestOptions,
        is_retry: bool,
    ) -> ApiResult<Value> {
        self.execute(endpoint, options, is_retry)
            .await
            .map(|(_, body)| body)
    }

    /// GET under `role` and unwrap the envelope's data
    pub async fn get_data<T: DeserializeOwned>(&self, endpoint: &str, role: Role) -> ApiResult<T> {
        let envelope: ApiEnvelope<T> = self
            .request(endpoint, RequestOptions::get().role(role))
            .await?;
        envelope.into_data()
    }

    /// POST `body` under `role` and return the whole envelope
    pub async fn post_json<B, T>(
        &self,
        endpoint: &str,
        role: Role,
        body: &B,
    ) -> ApiResult<ApiEnvelope<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = RequestOptions::post().role(role).json(body)?;
        self.request(endpoint, options).await
    }

    async fn execute(
        &self,
        endpoint: &str,
        options: RequestOptions,
        is_retry: bool,
    ) -> ApiResult<(u16, Value)> {
        let options = self.attach_credentials(options).await?;

        let original = match self.send_once(endpoint, &options).await {
            Err(err) if err.is_unauthorized() && !is_retry => err,
            other => return other,
        };

        let Some(role) = self.resolve_role(&options).await? else {
            debug!(endpoint, "401 without an identifiable session, not refreshing");
            return Err(original);
        };

        let tokens = match self.refresh_session(role, options.bearer_token()).await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => return Err(original),
            Err(err) if err.is_unauthorized() => return Err(err),
            Err(err) => {
                warn!(
                    role = %role,
                    endpoint,
                    error = %err,
                    "Token refresh failed, keeping session and surfacing original 401"
                );
                return Err(original);
            }
        };

        debug!(role = %role, endpoint, "Retrying request with refreshed token");
        let retry = options.bearer(&tokens.access_token);
        self.send_once(endpoint, &retry).await
    }

    /// Attach the role's access token unless the caller supplied credentials
    async fn attach_credentials(&self, options: RequestOptions) -> ApiResult<RequestOptions> {
        let Some(role) = options.role else {
            return Ok(options);
        };
        if options.authorization().is_some() {
            return Ok(options);
        }
        match self.inner.sessions.get(role).access_token().await? {
            Some(token) => Ok(options.bearer(&token)),
            None => Ok(options),
        }
    }

    /// The session a rejected request belongs to: the explicit role, or
    /// else whichever session holds the bearer token it was sent with
    async fn resolve_role(&self, options: &RequestOptions) -> ApiResult<Option<Role>> {
        if let Some(role) = options.role {
            return Ok(Some(role));
        }
        match options.bearer_token() {
            Some(token) => self.inner.sessions.role_for_access_token(token).await,
            None => Ok(None),
        }
    }

    async fn send_once(&self, endpoint: &str, options: &RequestOptions) -> ApiResult<(u16, Value)> {
        let url = self.url_for(endpoint);
        let headers = options.wire_headers();

        debug!(method = %options.method, endpoint, "Sending API request");
        let response = self
            .inner
            .http
            .send(options.method.clone(), &url, &headers, options.body.clone())
            .await
            .map_err(|e| {
                warn!(endpoint, error = %e, "API request failed to send");
                ApiError::transport(e)
            })?;

        let status = response.status();
        match response::classify(&response) {
            Ok(body) => Ok((status, body)),
            Err(err) => {
                debug!(endpoint, status, code = %err.code(), "API request returned an error");
                Err(err)
            }
        }
    }
}
