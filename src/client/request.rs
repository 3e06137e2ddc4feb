use http::Method;
use serde::Serialize;
use std::collections::HashMap;

use crate::auth::Role;
use crate::error::{ApiError, ApiResult};

pub(crate) const AUTHORIZATION: &str = "authorization";
pub(crate) const CONTENT_TYPE: &str = "content-type";

/// Everything about a call except its endpoint
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    /// Serialized JSON body
    pub body: Option<String>,
    /// Session whose credentials this call runs under
    pub role: Option<Role>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HashMap::new(),
            body: None,
            role: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Set a header, replacing any previous value regardless of case
    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    /// Send `token` as the bearer credential
    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION, format!("Bearer {}", token))
    }

    /// Run this call under `role`'s session: its access token is attached
    /// when no Authorization header is given, and it is refreshed on a 401
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Serialize `body` as the JSON payload
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> ApiResult<Self> {
        let encoded = serde_json::to_string(body).map_err(|e| ApiError::Encode(e.to_string()))?;
        self.body = Some(encoded);
        Ok(self)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).map(String::as_str)
    }

    /// The token of a `Bearer` Authorization header
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.authorization()?.trim();
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|token| !token.is_empty())
    }

    /// Headers as sent: JSON content type, overridden by caller headers
    pub(crate) fn wire_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::with_capacity(self.headers.len() + 1);
        headers.insert(CONTENT_TYPE.to_string(), "application/json".to_string());
        headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        headers
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}
