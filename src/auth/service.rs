use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

use crate::auth::session::TokenUpdate;
use crate::auth::token::{Role, TokenPair};
use crate::client::{ApiClient, ApiEnvelope, RequestOptions};
use crate::error::ApiResult;
use crate::event_bus::ClearReason;

pub const USER_LOGIN_ENDPOINT: &str = "/auth/login";
pub const ADMIN_LOGIN_ENDPOINT: &str = "/auth/admin/login";
pub const LOGOUT_ENDPOINT: &str = "/auth/logout";

/// Login credentials
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `data` of a successful login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// The user or admin profile, under whichever key the endpoint uses
    #[serde(default, alias = "admin")]
    pub user: Option<Value>,
}

/// Login and logout flows; the only places token pairs are created or
/// deliberately destroyed
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn login_endpoint(role: Role) -> &'static str {
        match role {
            Role::User => USER_LOGIN_ENDPOINT,
            Role::Admin => ADMIN_LOGIN_ENDPOINT,
        }
    }

    /// Log in and store the new session for `role`
    pub async fn login(&self, role: Role, credentials: &Credentials) -> ApiResult<LoginData> {
        // No role on the request: a 401 here means bad credentials, not an
        // expired session
        let options = RequestOptions::post().json(credentials)?;
        let envelope: ApiEnvelope<LoginData> = self
            .client
            .request(Self::login_endpoint(role), options)
            .await?;
        let data = envelope.into_data()?;

        let session = self.client.sessions().get(role);
        session.set_tokens(&data.tokens, TokenUpdate::Login).await?;
        if let Some(profile) = &data.user {
            session.set_profile(profile).await?;
        }

        info!(role = %role, "Logged in");
        Ok(data)
    }

    /// End `role`'s session. The server is told on a best-effort basis; the
    /// local session is cleared either way.
    pub async fn logout(&self, role: Role) -> ApiResult<()> {
        let session = self.client.sessions().get(role);

        if let Some(token) = session.access_token().await? {
            let notify = RequestOptions::post().bearer(&token).json(&serde_json::json!({
                "role": role,
            }));
            let result = match notify {
                Ok(options) => self
                    .client
                    .request_with(LOGOUT_ENDPOINT, options, true)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(role = %role, error = %e, "Server-side logout failed, clearing local session anyway");
            }
        }

        session.clear(ClearReason::Logout).await
    }
}
