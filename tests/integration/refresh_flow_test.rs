//! Refresh-and-retry over real HTTP
use anyhow::Result;
use mockito::Matcher;
use serde_json::json;

use crate::integration::test_harness::{token_envelope, unauthorized, TestEnvironment};
use kirkidata_client::{RequestOptions, Role};

/// An expired access token is refreshed once and the call replayed
#[tokio::test]
async fn test_expired_session_recovers_and_persists() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    env.login(Role::User, "A1", "R1").await?;

    let rejected = env
        .server
        .mock("GET", "/api/v1/users/me")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(unauthorized().to_string())
        .expect(1)
        .create_async()
        .await;
    let accepted = env
        .server
        .mock("GET", "/api/v1/users/me")
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "success": true, "data": { "email": "ada@example.com" } }).to_string())
        .expect(1)
        .create_async()
        .await;
    let refresh = env
        .server
        .mock("POST", "/api/v1/auth/refresh")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({ "refreshToken": "R1", "role": "user" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_envelope("A2", "R2").to_string())
        .expect(1)
        .create_async()
        .await;

    let body = env
        .client
        .request_value("/users/me", RequestOptions::get().role(Role::User))
        .await?;
    assert_eq!(body["data"]["email"], "ada@example.com");

    rejected.assert_async().await;
    accepted.assert_async().await;
    refresh.assert_async().await;

    // The new pair survives a restart
    assert_eq!(env.persisted("token").await?.as_deref(), Some("A2"));
    assert_eq!(env.persisted("refreshToken").await?.as_deref(), Some("R2"));
    Ok(())
}

/// A rejected refresh token wipes the session from disk
#[tokio::test]
async fn test_rejected_refresh_token_ends_session() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    env.login(Role::User, "A1", "R1").await?;
    env.sessions
        .user()
        .set_profile(&json!({ "email": "ada@example.com" }))
        .await?;

    let call = env.mock_json("GET", "/wallet", 401, &unauthorized()).await;
    let refresh = env
        .mock_json(
            "POST",
            "/auth/refresh",
            401,
            &json!({ "success": false, "message": "Invalid refresh token" }),
        )
        .await;

    let err = env
        .client
        .request_value("/wallet", RequestOptions::get().role(Role::User))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    call.assert_async().await;
    refresh.assert_async().await;
    for key in ["token", "refreshToken", "user"] {
        assert_eq!(env.persisted(key).await?, None, "{} should be cleared", key);
    }
    Ok(())
}

/// An unreachable refresh endpoint leaves the session intact
#[tokio::test]
async fn test_failing_refresh_endpoint_keeps_session() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    env.login(Role::User, "A1", "R1").await?;

    let _call = env.mock_json("GET", "/wallet", 401, &unauthorized()).await;
    let refresh = env
        .server
        .mock("POST", "/api/v1/auth/refresh")
        .with_status(503)
        .with_header("content-type", "text/html")
        .with_body("<html><body>Service Unavailable</body></html>")
        .expect(2)
        .create_async()
        .await;

    let err = env
        .client
        .request_value("/wallet", RequestOptions::get().role(Role::User))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Authentication required: Token expired");
    refresh.assert_async().await;
    assert_eq!(env.persisted("token").await?.as_deref(), Some("A1"));
    assert_eq!(env.persisted("refreshToken").await?.as_deref(), Some("R1"));
    Ok(())
}

/// Refreshing the admin session never touches the user's keys
#[tokio::test]
async fn test_admin_refresh_is_isolated() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    env.login(Role::User, "A1", "R1").await?;
    env.login(Role::Admin, "X1", "Y1").await?;

    let _rejected = env
        .server
        .mock("GET", "/api/v1/admin/dashboard")
        .match_header("authorization", "Bearer X1")
        .with_status(401)
        .with_body(unauthorized().to_string())
        .create_async()
        .await;
    let _accepted = env
        .server
        .mock("GET", "/api/v1/admin/dashboard")
        .match_header("authorization", "Bearer X2")
        .with_status(200)
        .with_body(json!({ "success": true, "data": {} }).to_string())
        .create_async()
        .await;
    let refresh = env
        .server
        .mock("POST", "/api/v1/auth/refresh")
        .match_body(Matcher::Json(json!({ "refreshToken": "Y1", "role": "admin" })))
        .with_status(200)
        .with_body(token_envelope("X2", "Y2").to_string())
        .expect(1)
        .create_async()
        .await;

    env.client
        .request_value("/admin/dashboard", RequestOptions::get().role(Role::Admin))
        .await?;

    refresh.assert_async().await;
    assert_eq!(env.persisted("adminToken").await?.as_deref(), Some("X2"));
    assert_eq!(env.persisted("adminRefreshToken").await?.as_deref(), Some("Y2"));
    assert_eq!(env.persisted("token").await?.as_deref(), Some("A1"));
    assert_eq!(env.persisted("refreshToken").await?.as_deref(), Some("R1"));
    Ok(())
}

/// Parallel calls that all hit an expired token share one refresh
#[tokio::test]
async fn test_parallel_401s_refresh_once() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    env.login(Role::User, "A1", "R1").await?;

    let _rejected = env
        .server
        .mock("GET", Matcher::Regex(r"^/api/v1/items/\d+$".to_string()))
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .with_body(unauthorized().to_string())
        .create_async()
        .await;
    let _accepted = env
        .server
        .mock("GET", Matcher::Regex(r"^/api/v1/items/\d+$".to_string()))
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .with_body(json!({ "success": true }).to_string())
        .create_async()
        .await;
    let refresh = env
        .server
        .mock("POST", "/api/v1/auth/refresh")
        .with_status(200)
        .with_body(token_envelope("A2", "R2").to_string())
        .expect(1)
        .create_async()
        .await;

    let calls = (0..4).map(|i| {
        let client = env.client.clone();
        tokio::spawn(async move {
            client
                .request_value(&format!("/items/{}", i), RequestOptions::get().role(Role::User))
                .await
        })
    });
    for result in futures::future::join_all(calls).await {
        assert_eq!(result??["success"], true);
    }

    refresh.assert_async().await;
    Ok(())
}
