use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ApiClient, ApiEnvelope, RequestOptions};
use crate::auth::{Role, TokenPair, TokenUpdate};
use crate::common::retry::{exponential_backoff, with_jitter, with_retry_when};
use crate::error::{ApiError, ApiResult};
use crate::event_bus::ClearReason;

/// Shared endpoint for both roles; the body's `role` picks the session
pub const REFRESH_ENDPOINT: &str = "/auth/refresh";

const MAX_REFRESH_BACKOFF_MS: u64 = 5_000;

/// Replaced access tokens remembered per role
const SUPERSEDED_HISTORY: usize = 4;

pub(super) type InFlightRefresh = Shared<BoxFuture<'static, ApiResult<TokenPair>>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
    role: Role,
}

impl ApiClient {
    /// Exchange `role`'s stored refresh token for a new pair.
    ///
    /// Fails without touching the network when no refresh token is stored.
    /// The new pair is returned, not persisted.
    pub async fn refresh_token(&self, role: Role) -> ApiResult<TokenPair> {
        let refresh_token = self.stored_refresh_token(role).await?;
        self.exchange_refresh_token(role, &refresh_token).await
    }

    pub async fn refresh_user_token(&self) -> ApiResult<TokenPair> {
        self.refresh_token(Role::User).await
    }

    pub async fn refresh_admin_token(&self) -> ApiResult<TokenPair> {
        self.refresh_token(Role::Admin).await
    }

    /// Refresh `role`'s session and persist the result, exactly as a 401
    /// recovery would: a rejected refresh token ends the session.
    pub async fn renew_session(&self, role: Role) -> ApiResult<TokenPair> {
        self.refresh_session(role, None).await?.ok_or_else(|| {
            ApiError::authentication_required(format!("No {} session to refresh", role))
        })
    }

    async fn stored_refresh_token(&self, role: Role) -> ApiResult<String> {
        self.inner
            .sessions
            .get(role)
            .refresh_token()
            .await?
            .ok_or_else(|| {
                ApiError::authentication_required(format!(
                    "No refresh token available for {} session",
                    role
                ))
            })
    }

    /// One call to the refresh endpoint. Goes straight to the transport so
    /// a 401 here can never start another refresh.
    async fn exchange_refresh_token(&self, role: Role, refresh_token: &str) -> ApiResult<TokenPair> {
        let options = RequestOptions::post().json(&RefreshRequest {
            refresh_token,
            role,
        })?;
        let (status, body) = self.send_once(REFRESH_ENDPOINT, &options).await?;
        let envelope: ApiEnvelope<TokenPair> =
            serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse {
                status,
                reason: e.to_string(),
            })?;
        envelope.into_data()
    }

    /// Fresh tokens for `role`, sharing the work with any refresh of the
    /// same role already in progress.
    ///
    /// `rejected` is the access token the server just refused. `None` comes
    /// back when that token never belonged to this session: the caller
    /// chose its own credentials and nothing is swapped in for them. A token
    /// the session held before a refresh replaced it is answered with the
    /// current pair instead of refreshing again.
    ///
    /// The refresh runs on its own task and leaves the in-flight map itself,
    /// after storing its result, so a cancelled caller cannot strand it and
    /// checks made under the lock always see a consistent session.
    pub(super) async fn refresh_session(
        &self,
        role: Role,
        rejected: Option<&str>,
    ) -> ApiResult<Option<TokenPair>> {
        let refresh = {
            let mut in_flight = self.inner.in_flight.lock().await;

            if let Some(rejected) = rejected {
                let session = self.inner.sessions.get(role);
                let current = session.access_token().await?;
                if current.as_deref() != Some(rejected) {
                    if !self.was_superseded(role, rejected).await {
                        debug!(role = %role, "Rejected credential is not this session's, not recovering");
                        return Ok(None);
                    }
                    if in_flight.get(&role).is_none() {
                        if let Some(current) = session.tokens().await? {
                            debug!(role = %role, "Session was refreshed concurrently, reusing new token");
                            return Ok(Some(current));
                        }
                    }
                }
            }

            match in_flight.get(&role) {
                Some(existing) => {
                    debug!(role = %role, "Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let client = self.clone();
                    // Spawned while the lock is held, so the task's removal
                    // always finds its own entry
                    let task = tokio::spawn(async move {
                        let result = client.refresh_and_store(role).await;
                        client.inner.in_flight.lock().await.remove(&role);
                        result
                    });
                    let refresh = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(ApiError::transport(format!("token refresh task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(role, refresh.clone());
                    refresh
                }
            }
        };

        refresh.await.map(Some)
    }

    /// Whether `token` is one this role's session held before a refresh
    async fn was_superseded(&self, role: Role, token: &str) -> bool {
        self.inner
            .superseded
            .lock()
            .await
            .get(&role)
            .map_or(false, |tokens| tokens.iter().any(|t| t == token))
    }

    async fn record_superseded(&self, role: Role, token: String) {
        let mut superseded = self.inner.superseded.lock().await;
        let tokens = superseded.entry(role).or_default();
        if tokens.len() == SUPERSEDED_HISTORY {
            tokens.pop_front();
        }
        tokens.push_back(token);
    }

    /// Run the refresh call, retrying transient failures, then persist the
    /// new pair or end the session if the refresh token was rejected.
    async fn refresh_and_store(&self, role: Role) -> ApiResult<TokenPair> {
        let session = self.inner.sessions.get(role);
        let refresh_token = match self.stored_refresh_token(role).await {
            Ok(token) => token,
            Err(err) => {
                warn!(role = %role, "No refresh token stored, cannot recover session");
                return Err(err);
            }
        };

        info!(role = %role, "Access token rejected, refreshing session");
        let policy = self.inner.refresh_policy;
        let result = with_retry_when(
            || {
                let client = self.clone();
                let refresh_token = refresh_token.clone();
                Box::pin(async move { client.exchange_refresh_token(role, &refresh_token).await })
            },
            policy.max_attempts,
            "token refresh",
            with_jitter(exponential_backoff(
                policy.backoff_ms,
                Some(MAX_REFRESH_BACKOFF_MS),
            )),
            ApiError::is_transient,
        )
        .await;

        match result {
            Ok(tokens) => {
                let previous = session.access_token().await?;
                session.set_tokens(&tokens, TokenUpdate::Refresh).await?;
                if let Some(previous) = previous {
                    self.record_superseded(role, previous).await;
                }
                info!(role = %role, "Session refreshed");
                Ok(tokens)
            }
            Err(err) if err.is_unauthorized() => {
                warn!(role = %role, "Refresh token rejected, clearing session");
                session.clear(ClearReason::RefreshRejected).await?;
                Err(ApiError::authentication_required(
                    "Session expired, please log in again",
                ))
            }
            Err(err) => Err(err),
        }
    }
}
