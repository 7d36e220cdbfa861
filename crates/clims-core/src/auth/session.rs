use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::{Role, User};

use super::claims::TokenClaims;
use super::storage::TokenStorage;

/// Fixed storage keys the session is persisted under
pub mod keys {
    pub const ACCESS_TOKEN: &str = "clims_access_token";
    pub const REFRESH_TOKEN: &str = "clims_refresh_token";
    pub const ACCESS_EXPIRES_AT: &str = "clims_access_expires_at";
    pub const REFRESH_EXPIRES_AT: &str = "clims_refresh_expires_at";
    pub const USER_INFO: &str = "clims_user_info";

    pub const ALL: [&str; 5] = [
        ACCESS_TOKEN,
        REFRESH_TOKEN,
        ACCESS_EXPIRES_AT,
        REFRESH_EXPIRES_AT,
        USER_INFO,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn,
    Refreshing,
}

/// Token response of `/api/auth/login` and `/api/auth/refresh`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    /// Seconds until the access token expires
    pub expires_in: Option<i64>,
    /// Seconds until the refresh token expires
    pub refresh_expires_in: Option<i64>,
}

impl TokenPair {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.access_token.trim().is_empty() {
            return Err(ApiError::InvalidResponse("empty access token".to_string()));
        }
        if let Some(ref kind) = self.token_type {
            if !kind.eq_ignore_ascii_case("bearer") {
                return Err(ApiError::InvalidResponse(format!("unsupported token type: {}", kind)));
            }
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_expires_at: DateTime<Utc>,
    /// `None` when the backend did not say; the refresh token is then
    /// considered valid until the backend rejects it.
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

// Tokens stay out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_expires_at", &self.access_expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// `now + secs`, rejecting lifetimes a token response cannot sensibly carry.
fn expiry_after(now: DateTime<Utc>, secs: i64, field: &str) -> Result<DateTime<Utc>, ApiError> {
    if secs < 0 {
        return Err(ApiError::InvalidResponse(format!("negative {}: {}", field, secs)));
    }
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| ApiError::InvalidResponse(format!("{} out of range: {}", field, secs)))
}

impl Credential {
    /// Build a credential from a token response.
    ///
    /// `previous` is the credential being refreshed: when the response does
    /// not rotate the refresh token, the previous one (and its expiry) is kept.
    pub fn from_token_pair(
        pair: TokenPair,
        previous: Option<&Credential>,
        claims: Option<&TokenClaims>,
        now: DateTime<Utc>,
        default_access_ttl: Duration,
    ) -> Result<Self, ApiError> {
        pair.validate()?;

        let access_expires_at = match pair.expires_in {
            Some(secs) => expiry_after(now, secs, "expiresIn")?,
            None => claims
                .and_then(|c| c.expires_at())
                .or_else(|| now.checked_add_signed(default_access_ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let (refresh_token, refresh_expires_at) = match pair.refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                let expires_at = pair
                    .refresh_expires_in
                    .map(|secs| expiry_after(now, secs, "refreshExpiresIn"))
                    .transpose()?;
                (Some(token), expires_at)
            }
            None => match previous {
                Some(prev) => (prev.refresh_token.clone(), prev.refresh_expires_at),
                None => (None, None),
            },
        };

        Ok(Self {
            access_token: pair.access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_expires_at
    }

    /// Check if the access token will expire within `leeway` and should be refreshed
    pub fn needs_refresh(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        now.checked_add_signed(leeway)
            .map_or(true, |deadline| deadline >= self.access_expires_at)
    }

    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.refresh_token, self.refresh_expires_at) {
            (None, _) => true,
            (Some(_), Some(expiry)) => now >= expiry,
            (Some(_), None) => false,
        }
    }

    pub fn can_refresh(&self, now: DateTime<Utc>) -> bool {
        !self.is_refresh_expired(now)
    }

    /// A credential is usable while either token can still authenticate
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) || self.can_refresh(now)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.access_expires_at - now
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}

/// The signed-in user as reported by `/api/auth/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Option<i64>,
    pub username: String,
    pub email: Option<String>,
    pub role: Option<Role>,
    /// Department name
    pub department: Option<String>,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        let role = user.role();
        Self {
            id: Some(user.id),
            username: user.username,
            email: user.email,
            role,
            department: user.department,
        }
    }
}

impl Identity {
    /// Best-effort identity from token claims, used when `/me` is unavailable
    pub fn from_claims(claims: &TokenClaims, fallback_username: &str) -> Self {
        Self {
            id: None,
            username: claims
                .sub
                .clone()
                .unwrap_or_else(|| fallback_username.to_string()),
            email: None,
            role: claims.primary_role().as_deref().and_then(Role::parse),
            department: None,
        }
    }
}

/// Reads and writes the session under the fixed storage keys
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn TokenStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self { storage }
    }

    /// Load a persisted session. Partial or corrupt state is treated as absent.
    pub fn load(&self) -> Result<Option<(Credential, Option<Identity>)>> {
        let access_token = match self.storage.get(keys::ACCESS_TOKEN)? {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(None),
        };

        let access_expires_at = match self.read_timestamp(keys::ACCESS_EXPIRES_AT)? {
            Some(ts) => ts,
            None => {
                warn!("Stored session has no access expiry, discarding");
                return Ok(None);
            }
        };

        let credential = Credential {
            access_token,
            refresh_token: self.storage.get(keys::REFRESH_TOKEN)?,
            access_expires_at,
            refresh_expires_at: self.read_timestamp(keys::REFRESH_EXPIRES_AT)?,
        };

        let identity = match self.storage.get(keys::USER_INFO)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable stored user info");
                    None
                }
            },
            None => None,
        };

        debug!(?credential, "Session loaded from storage");
        Ok(Some((credential, identity)))
    }

    pub fn save(&self, credential: &Credential, identity: Option<&Identity>) -> Result<()> {
        self.storage.set(keys::ACCESS_TOKEN, &credential.access_token)?;
        self.storage
            .set(keys::ACCESS_EXPIRES_AT, &credential.access_expires_at.to_rfc3339())?;

        match credential.refresh_token {
            Some(ref token) => self.storage.set(keys::REFRESH_TOKEN, token)?,
            None => self.storage.remove(keys::REFRESH_TOKEN)?,
        }
        match credential.refresh_expires_at {
            Some(expiry) => self.storage.set(keys::REFRESH_EXPIRES_AT, &expiry.to_rfc3339())?,
            None => self.storage.remove(keys::REFRESH_EXPIRES_AT)?,
        }

        self.save_identity(identity)
    }

    pub fn save_identity(&self, identity: Option<&Identity>) -> Result<()> {
        match identity {
            Some(identity) => {
                let raw = serde_json::to_string(identity)?;
                self.storage.set(keys::USER_INFO, &raw)
            }
            None => self.storage.remove(keys::USER_INFO),
        }
    }

    /// Remove every session key
    pub fn clear(&self) -> Result<()> {
        for key in keys::ALL {
            self.storage
                .remove(key)
                .with_context(|| format!("Failed to remove {}", key))?;
        }
        Ok(())
    }

    fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.storage.get(key)? {
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
                Err(e) => {
                    warn!(key, error = %e, "Ignoring unparseable stored timestamp");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}
