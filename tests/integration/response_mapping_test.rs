//! How raw HTTP responses surface to callers
use anyhow::Result;
use serde_json::json;

use crate::integration::test_harness::TestEnvironment;
use kirkidata_client::{ApiError, ErrorCode, KnownCause, RequestOptions, Role};

#[tokio::test]
async fn test_success_body_is_untouched() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    let body = json!({
        "success": true,
        "message": "Plans fetched",
        "data": [{ "id": "mtn-1gb", "price": 300 }],
        "timestamp": "2024-06-01T12:00:00.000Z"
    });
    let _plans = env.mock_json("GET", "/billing/plans", 200, &body).await;

    let returned = env
        .client
        .request_value("/billing/plans", RequestOptions::get())
        .await?;
    assert_eq!(returned, body);
    Ok(())
}

#[tokio::test]
async fn test_non_json_bodies() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    let _ok = env
        .server
        .mock("GET", "/api/v1/health")
        .with_status(200)
        .with_body("OK")
        .create_async()
        .await;
    let _gateway = env
        .server
        .mock("GET", "/api/v1/wallet")
        .with_status(502)
        .with_header("content-type", "text/html")
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let err = env
        .client
        .request_value("/health", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidResponse);

    let err = env
        .client
        .request_value("/wallet", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Protocol { status: 502 });
    assert_eq!(err.to_string(), "Server error: 502");
    Ok(())
}

#[tokio::test]
async fn test_insufficient_balance_is_mapped() -> Result<()> {
    let mut env = TestEnvironment::new().await?;
    env.login(Role::User, "A1", "R1").await?;
    let purchase = env
        .server
        .mock("POST", "/api/v1/billing/airtime")
        .match_header("authorization", "Bearer A1")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::Json(json!({ "phone": "08030000000", "amount": 500 })))
        .with_status(400)
        .with_body(json!({ "success": false, "message": "Insufficient balance" }).to_string())
        .create_async()
        .await;

    let err = env
        .client
        .post_json::<_, serde_json::Value>(
            "/billing/airtime",
            Role::User,
            &json!({ "phone": "08030000000", "amount": 500 }),
        )
        .await
        .unwrap_err();

    purchase.assert_async().await;
    assert_eq!(err.known_cause(), Some(KnownCause::InsufficientBalance));
    assert_eq!(err.status(), Some(400));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() -> Result<()> {
    let env = TestEnvironment::new().await?;
    let mut config = kirkidata_client::ClientConfig::new("http://127.0.0.1:9/api/v1");
    config.request_timeout_secs = 2;
    let client = kirkidata_client::ApiClient::from_config(&config, env.sessions.clone())?;

    let err = client
        .request_value("/health", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Transport);
    Ok(())
}
