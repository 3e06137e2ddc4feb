//! Session persistence across process restarts
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use crate::integration::test_harness::TestEnvironment;
use kirkidata_client::{
    AuthApi, ClearReason, ClientConfig, Credentials, JsonFileStore, Role, SessionEventBus,
    SessionStore, Sessions,
};

#[tokio::test]
async fn test_login_survives_restart() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    let login = env
        .mock_json(
            "POST",
            "/auth/login",
            200,
            &json!({
                "success": true,
                "data": {
                    "accessToken": "A1",
                    "refreshToken": "R1",
                    "user": { "email": "ada@example.com" }
                }
            }),
        )
        .await;

    AuthApi::new(env.client.clone())
        .login(Role::User, &Credentials::new("ada@example.com", "hunter2"))
        .await?;
    login.assert_async().await;

    // A second process opening the same file sees the session
    let store = env.reopen_store().await?;
    let sessions = Sessions::new(Arc::new(store), SessionEventBus::default());
    let status = sessions.user().status().await?;
    assert!(status.authenticated);
    assert!(status.has_refresh_token);
    assert!(status.has_profile);
    assert!(!sessions.admin().is_authenticated().await?);
    Ok(())
}

#[tokio::test]
async fn test_clear_removes_only_one_role() -> Result<()> {
    let env = TestEnvironment::new().await?;
    env.login(Role::User, "A1", "R1").await?;
    env.login(Role::Admin, "X1", "Y1").await?;

    env.sessions.admin().clear(ClearReason::Logout).await?;

    let store = env.reopen_store().await?;
    assert_eq!(store.get("token").await?.as_deref(), Some("A1"));
    assert_eq!(store.get("adminToken").await?, None);
    assert_eq!(store.get("adminRefreshToken").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_session_file_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    tokio::fs::write(&path, "{ not json").await?;

    assert!(JsonFileStore::open(&path).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_config_file_drives_client() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.json");
    tokio::fs::write(
        &path,
        json!({
            "base_url": "https://staging.kirkidata.test/api/v1/",
            "request_timeout_secs": 10,
            "refresh_max_attempts": 5,
            "refresh_backoff_ms": 100,
            "session_path": dir.path().join("s.json")
        })
        .to_string(),
    )
    .await?;

    let config = ClientConfig::load_from_file(&path).await?;
    assert_eq!(config.base_url(), "https://staging.kirkidata.test/api/v1");
    assert_eq!(config.refresh_max_attempts, 5);

    let store = JsonFileStore::open(&config.session_path).await?;
    let sessions = Sessions::new(Arc::new(store), SessionEventBus::default());
    let client = kirkidata_client::ApiClient::from_config(&config, sessions)?;
    assert_eq!(
        client.url_for("/users/me"),
        "https://staging.kirkidata.test/api/v1/users/me"
    );
    Ok(())
}
