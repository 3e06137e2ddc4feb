//! Test environment shared by the integration tests

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use mockito::{Mock, ServerGuard};
use serde_json::{json, Value};
use tempfile::TempDir;

use kirkidata_client::auth::TokenUpdate;
use kirkidata_client::{
    ApiClient, ClientConfig, JsonFileStore, Role, SessionEventBus, SessionStore, Sessions,
    TokenPair,
};

/// A mock API server plus a client whose sessions live in a temp file
pub struct TestEnvironment {
    pub server: ServerGuard,
    pub client: ApiClient,
    pub sessions: Sessions,
    pub session_path: PathBuf,
    _dir: TempDir,
}

impl TestEnvironment {
    /// Create a new test environment
    pub async fn new() -> Result<Self> {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir()?;
        let session_path = dir.path().join("session.json");

        let mut config = ClientConfig::new(format!("{}/api/v1", server.url()));
        config.request_timeout_secs = 5;
        config.refresh_max_attempts = 2;
        config.refresh_backoff_ms = 1;
        config.session_path = session_path.clone();

        let store = JsonFileStore::open(&session_path).await?;
        let sessions = Sessions::new(Arc::new(store), SessionEventBus::default());
        let client = ApiClient::from_config(&config, sessions.clone())?;

        Ok(Self {
            server,
            client,
            sessions,
            session_path,
            _dir: dir,
        })
    }

    /// Store a logged-in session for `role`
    pub async fn login(&self, role: Role, access: &str, refresh: &str) -> Result<()> {
        self.sessions
            .get(role)
            .set_tokens(&TokenPair::new(access, refresh), TokenUpdate::Login)
            .await?;
        Ok(())
    }

    /// Re-read the session file from disk, as a fresh process would
    pub async fn reopen_store(&self) -> Result<JsonFileStore> {
        JsonFileStore::open(&self.session_path).await
    }

    /// Value of `key` in the session file on disk
    pub async fn persisted(&self, key: &str) -> Result<Option<String>> {
        self.reopen_store().await?.get(key).await
    }

    /// Mock a JSON response on `path` (relative to the API prefix)
    pub async fn mock_json(&mut self, method: &str, path: &str, status: usize, body: &Value) -> Mock {
        self.server
            .mock(method, format!("/api/v1{}", path).as_str())
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }
}

pub fn unauthorized() -> Value {
    json!({ "success": false, "message": "Token expired" })
}

pub fn token_envelope(access: &str, refresh: &str) -> Value {
    json!({
        "success": true,
        "message": "Token refreshed successfully",
        "data": { "accessToken": access, "refreshToken": refresh }
    })
}
