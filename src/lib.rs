//! Authenticated API client for the Kirkidata/OtoBill reseller service.
//!
//! The client keeps one session per role (customer and admin), attaches the
//! right bearer token to each call, and transparently recovers an expired
//! access token with a single refresh-and-retry.
//!
//! ```no_run
//! # async fn demo() -> kirkidata_client::ApiResult<()> {
//! use std::sync::Arc;
//! use kirkidata_client::{ApiClient, ClientConfig, MemoryStore, Role, SessionEventBus, Sessions};
//!
//! let sessions = Sessions::new(Arc::new(MemoryStore::new()), SessionEventBus::default());
//! let client = ApiClient::from_config(&ClientConfig::new("https://api.example.com"), sessions)?;
//! let me: serde_json::Value = client.get_data("/users/me", Role::User).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod http_client;

pub use auth::{
    AuthApi, Credentials, JsonFileStore, MemoryStore, Role, SessionManager, SessionStore,
    Sessions, TokenClaims, TokenPair,
};
pub use client::{ApiClient, ApiEnvelope, RequestOptions};
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult, ErrorCode, KnownCause};
pub use event_bus::{ClearReason, SessionEvent, SessionEventBus, SessionEventKind};
pub use http_client::{HttpClient, ReqwestHttpClient, SimpleHttpResponse};
