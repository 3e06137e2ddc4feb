use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two independent sessions a token pair belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Customer dashboard session
    User,
    /// Admin console session
    Admin,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::User, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(anyhow!("Unknown role '{}'", other)),
        }
    }
}

/// Access/refresh credentials for one role, as the API exchanges them
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Decode the access token's claims
    pub fn claims(&self) -> Result<TokenClaims> {
        TokenClaims::decode(&self.access_token)
    }
}

// Tokens stay out of logs even when a pair is debug-printed.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// The subset of JWT claims the client looks at.
///
/// Decoded without signature verification; only for diagnostics and
/// expiry display, never for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Decode the payload segment of a JWT
    pub fn decode(token: &str) -> Result<Self> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => return Err(anyhow!("Token is not a JWT")),
        };

        // Some issuers pad their segments even though JWTs shouldn't be.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| anyhow!("Token payload is not base64url: {}", e))?;
        let claims = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("Token payload is not valid JSON: {}", e))?;
        Ok(claims)
    }

    /// When the token expires, if it says
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// When the token was issued, if it says
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| Utc.timestamp_opt(iat, 0).single())
    }

    /// Whether the token has expired as of `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(false, |exp| exp <= now)
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Calculate seconds until expiration
    pub fn seconds_until_expiration(&self) -> Option<i64> {
        self.expires_at().map(|exp| (exp - Utc::now()).num_seconds())
    }
}

#[cfg(test)]
pub(crate) fn make_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trip_names() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("guest".parse::<Role>().is_err());
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), json!("admin"));
    }

    #[test]
    fn test_token_pair_wire_shape() {
        let pair: TokenPair =
            serde_json::from_value(json!({"accessToken": "A2", "refreshToken": "R2"})).unwrap();
        assert_eq!(pair, TokenPair::new("A2", "R2"));
        assert!(!format!("{:?}", pair).contains("A2"));
    }

    #[test]
    fn test_decode_claims() {
        let token = make_jwt(&json!({"sub": "42", "role": "admin", "iat": 1700000000, "exp": 1700003600}));
        let claims = TokenClaims::decode(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("42"));
        assert_eq!(claims.role.as_deref(), Some("admin"));
        assert_eq!(claims.expires_at().unwrap().timestamp(), 1700003600);
        assert!(claims.is_expired());
        assert!(!claims.is_expired_at(Utc.timestamp_opt(1700000001, 0).unwrap()));
    }

    #[test]
    fn test_decode_rejects_opaque_tokens() {
        assert!(TokenClaims::decode("A1").is_err());
        assert!(TokenClaims::decode("a.%%%.c").is_err());
        assert!(TokenClaims::decode("a.bm90IGpzb24.c").is_err());
    }
}
