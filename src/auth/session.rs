use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::storage::SessionStore;
use crate::auth::token::{Role, TokenClaims, TokenPair};
use crate::error::{ApiError, ApiResult};
use crate::event_bus::{ClearReason, SessionEvent, SessionEventBus, SessionEventKind};

/// Persisted keys that make up one role's session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKeys {
    pub access_token: &'static str,
    pub refresh_token: &'static str,
    pub profile: &'static str,
}

impl SessionKeys {
    /// The keys owned by `role`; the two roles never share a key
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::User => SessionKeys {
                access_token: "token",
                refresh_token: "refreshToken",
                profile: "user",
            },
            Role::Admin => SessionKeys {
                access_token: "adminToken",
                refresh_token: "adminRefreshToken",
                profile: "admin",
            },
        }
    }

    pub fn all(&self) -> [&'static str; 3] {
        [self.access_token, self.refresh_token, self.profile]
    }
}

/// How a token pair came to be stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUpdate {
    Login,
    Refresh,
}

/// Snapshot of a session, for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub role: Role,
    pub authenticated: bool,
    pub has_refresh_token: bool,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub has_profile: bool,
}

/// Owns the persisted token pair and cached profile of a single role
#[derive(Clone)]
pub struct SessionManager {
    role: Role,
    keys: SessionKeys,
    store: Arc<dyn SessionStore>,
    events: SessionEventBus,
}

impl SessionManager {
    pub fn new(role: Role, store: Arc<dyn SessionStore>, events: SessionEventBus) -> Self {
        Self {
            role,
            keys: SessionKeys::for_role(role),
            store,
            events,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn keys(&self) -> SessionKeys {
        self.keys
    }

    async fn read(&self, key: &str) -> ApiResult<Option<String>> {
        let value = self.store.get(key).await.map_err(ApiError::storage)?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    pub async fn access_token(&self) -> ApiResult<Option<String>> {
        self.read(self.keys.access_token).await
    }

    pub async fn refresh_token(&self) -> ApiResult<Option<String>> {
        self.read(self.keys.refresh_token).await
    }

    /// Both tokens, if both are present
    pub async fn tokens(&self) -> ApiResult<Option<TokenPair>> {
        match (self.access_token().await?, self.refresh_token().await?) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair::new(access, refresh))),
            _ => Ok(None),
        }
    }

    /// Persist a token pair and announce it
    pub async fn set_tokens(&self, tokens: &TokenPair, update: TokenUpdate) -> ApiResult<()> {
        // Both halves in one write so a failure never leaves a mixed pair
        self.store
            .set_many(vec![
                (self.keys.access_token, tokens.access_token.clone()),
                (self.keys.refresh_token, tokens.refresh_token.clone()),
            ])
            .await
            .map_err(ApiError::storage)?;

        let kind = match update {
            TokenUpdate::Login => SessionEventKind::LoggedIn,
            TokenUpdate::Refresh => SessionEventKind::TokensRefreshed,
        };
        debug!(role = %self.role, ?update, "Stored session tokens");
        self.events.publish(SessionEvent::new(self.role, kind)).await;
        Ok(())
    }

    /// Remove tokens and cached profile
    pub async fn clear(&self, reason: ClearReason) -> ApiResult<()> {
        for key in self.keys.all() {
            self.store.remove(key).await.map_err(ApiError::storage)?;
        }

        info!(role = %self.role, ?reason, "Session cleared");
        self.events
            .publish(SessionEvent::new(
                self.role,
                SessionEventKind::SessionCleared { reason },
            ))
            .await;
        Ok(())
    }

    /// The cached profile. A profile that no longer parses is treated as absent.
    pub async fn profile<T: DeserializeOwned>(&self) -> ApiResult<Option<T>> {
        let Some(raw) = self.read(self.keys.profile).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(role = %self.role, error = %e, "Ignoring unreadable cached profile");
                Ok(None)
            }
        }
    }

    pub async fn set_profile<T: Serialize>(&self, profile: &T) -> ApiResult<()> {
        let raw = serde_json::to_string(profile).map_err(ApiError::storage)?;
        self.store
            .set(self.keys.profile, raw)
            .await
            .map_err(ApiError::storage)
    }

    pub async fn is_authenticated(&self) -> ApiResult<bool> {
        Ok(self.access_token().await?.is_some())
    }

    /// Expiry decoded from the access token's claims, when it is a JWT
    pub async fn access_token_expiry(&self) -> ApiResult<Option<DateTime<Utc>>> {
        Ok(self
            .access_token()
            .await?
            .and_then(|token| TokenClaims::decode(&token).ok())
            .and_then(|claims| claims.expires_at()))
    }

    pub async fn status(&self) -> ApiResult<SessionStatus> {
        Ok(SessionStatus {
            role: self.role,
            authenticated: self.is_authenticated().await?,
            has_refresh_token: self.refresh_token().await?.is_some(),
            access_token_expires_at: self.access_token_expiry().await?,
            has_profile: self.read(self.keys.profile).await?.is_some(),
        })
    }

    /// Subscribe to session events. Events for the other role arrive too;
    /// filter on [`SessionEvent::role`].
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// The user and admin sessions, sharing one store and one event bus
#[derive(Clone)]
pub struct Sessions {
    user: SessionManager,
    admin: SessionManager,
    events: SessionEventBus,
}

impl Sessions {
    pub fn new(store: Arc<dyn SessionStore>, events: SessionEventBus) -> Self {
        Self {
            user: SessionManager::new(Role::User, Arc::clone(&store), events.clone()),
            admin: SessionManager::new(Role::Admin, store, events.clone()),
            events,
        }
    }

    pub fn get(&self, role: Role) -> &SessionManager {
        match role {
            Role::User => &self.user,
            Role::Admin => &self.admin,
        }
    }

    pub fn user(&self) -> &SessionManager {
        &self.user
    }

    pub fn admin(&self) -> &SessionManager {
        &self.admin
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    /// The role whose stored access token equals `token`.
    ///
    /// Admin is checked first; a token held by both roles resolves to admin.
    pub async fn role_for_access_token(&self, token: &str) -> ApiResult<Option<Role>> {
        for role in [Role::Admin, Role::User] {
            if self.get(role).access_token().await?.as_deref() == Some(token) {
                return Ok(Some(role));
            }
        }
        Ok(None)
    }
}
