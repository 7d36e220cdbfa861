//! Session manager: owns the credential and issues authenticated requests.
//!
//! State machine: `SignedOut -> SignedIn` on login, `SignedIn -> Refreshing`
//! when a call is rejected with 401 or the access token is about to expire,
//! `Refreshing -> SignedIn` on a successful refresh and `Refreshing ->
//! SignedOut` when the refresh token is rejected. Logout always ends in
//! `SignedOut`, whatever the server says.
//!
//! Only one refresh is in flight at a time. Every change of the credential
//! bumps a generation counter; a caller that needs a refresh remembers the
//! generation its token came from and, once it holds the refresh gate, only
//! refreshes if nobody else has replaced the credential in the meantime.

use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::client::CHANGE_PASSWORD_PATH;
use crate::api::{ApiClient, ApiError, ChangePasswordResponse, RequestOptions};
use crate::config::Config;

use super::claims::decode_claims;
use super::session::{Credential, Identity, SessionState, SessionStore, TokenPair};
use super::storage::TokenStorage;

#[derive(Default)]
struct Inner {
    credential: Option<Credential>,
    identity: Option<Identity>,
    generation: u64,
}

/// Token handed to a single request attempt
struct ActiveToken {
    access_token: String,
    generation: u64,
    /// This call already went through a refresh
    refreshed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    current_password: Option<&'a str>,
    new_password: &'a str,
}

pub struct SessionManager {
    api: ApiClient,
    store: SessionStore,
    refresh_leeway: Duration,
    default_access_ttl: Duration,
    inner: RwLock<Inner>,
    refresh_gate: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(config: &Config, storage: Arc<dyn TokenStorage>) -> Result<Self, ApiError> {
        let api = ApiClient::new(config)?;
        Ok(Self::with_client(api, config, storage))
    }

    /// Build around an existing client (shares its connection pool)
    pub fn with_client(api: ApiClient, config: &Config, storage: Arc<dyn TokenStorage>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::SignedOut);
        Self {
            api,
            store: SessionStore::new(storage),
            refresh_leeway: config.refresh_leeway(),
            default_access_ttl: config.default_access_ttl(),
            inner: RwLock::new(Inner::default()),
            refresh_gate: Mutex::new(()),
            state_tx,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // ===== Lifecycle =====

    /// Restore a persisted session. Unusable or unreadable state is cleared.
    pub async fn init(&self) -> Result<SessionState, ApiError> {
        let loaded = match self.store.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session, starting signed out");
                // Unreadable and not even removable: the backend is broken
                self.store
                    .clear()
                    .map_err(|e| ApiError::Storage(format!("{:#}", e)))?;
                None
            }
        };

        let now = Utc::now();
        let mut inner = self.inner.write().await;
        match loaded {
            Some((credential, identity)) if credential.is_usable(now) => {
                debug!(?credential, "Restored session");
                inner.credential = Some(credential);
                inner.identity = identity;
                inner.generation += 1;
                drop(inner);
                self.set_state(SessionState::SignedIn);
                Ok(SessionState::SignedIn)
            }
            Some(_) => {
                info!("Stored session has expired");
                inner.credential = None;
                inner.identity = None;
                inner.generation += 1;
                drop(inner);
                self.clear_storage();
                self.set_state(SessionState::SignedOut);
                Ok(SessionState::SignedOut)
            }
            None => {
                drop(inner);
                self.set_state(SessionState::SignedOut);
                Ok(SessionState::SignedOut)
            }
        }
    }

    /// Drop in-memory state without touching storage
    pub async fn teardown(&self) {
        let mut inner = self.inner.write().await;
        inner.credential = None;
        inner.identity = None;
        inner.generation += 1;
        drop(inner);
        self.set_state(SessionState::SignedOut);
    }

    // ===== Observers =====

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Receive every state change; `SignedOut` after a failed refresh means
    /// the consumer should show its login view.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.read().await.credential.is_some()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.inner.read().await.identity.clone()
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.inner.read().await.credential.clone()
    }

    // ===== Operations =====

    /// Start a new session. Each call logs in again, replacing any current session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, ApiError> {
        let pair = self.api.login(username, password).await?;
        let now = Utc::now();
        let claims = decode_claims(&pair.access_token).ok();
        let credential =
            Credential::from_token_pair(pair, None, claims.as_ref(), now, self.default_access_ttl)?;

        let identity = match self.api.me(&credential.access_token).await {
            Ok(user) => Identity::from(user),
            Err(e) => {
                warn!(error = %e, "Failed to fetch profile after login, using token claims");
                Identity::from_claims(&claims.unwrap_or_default(), username)
            }
        };

        let mut inner = self.inner.write().await;
        inner.credential = Some(credential.clone());
        inner.identity = Some(identity.clone());
        inner.generation += 1;
        drop(inner);

        if let Err(e) = self.store.save(&credential, Some(&identity)) {
            warn!(error = %e, "Failed to persist session");
        }
        self.set_state(SessionState::SignedIn);
        info!(username = %identity.username, "Signed in");
        Ok(identity)
    }

    /// Best-effort server-side revoke, then always clear the local session
    pub async fn logout(&self) {
        let refresh_token = self
            .inner
            .read()
            .await
            .credential
            .as_ref()
            .and_then(|c| c.refresh_token.clone());

        if let Some(token) = refresh_token {
            match self.api.logout(&token).await {
                Ok(()) => debug!("Refresh token revoked"),
                Err(e) => warn!(error = %e, "Failed to revoke refresh token, clearing local session anyway"),
            }
        }

        self.clear_session().await;
        info!("Signed out");
    }

    /// Send a request with the current access token.
    ///
    /// A 401 triggers exactly one refresh-and-retry. If the refresh token is
    /// rejected, or the retried request is rejected again, the session is
    /// cleared and the call fails with `SessionExpired`. Other error statuses
    /// are returned as-is without retrying.
    pub async fn authenticated_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response, ApiError> {
        let token = self.ensure_fresh_token().await?;
        let response = self
            .api
            .execute(path, &options, Some(&token.access_token))
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return ApiClient::check_response(response).await;
        }

        if token.refreshed {
            warn!(path, "Rejected right after a refresh, ending session");
            self.expire_if_current(token.generation).await;
            return Err(ApiError::SessionExpired);
        }

        debug!(path, "Access token rejected, refreshing");
        let retry = self.refresh_after(token.generation).await?;
        let response = self
            .api
            .execute(path, &options, Some(&retry.access_token))
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "Retried request rejected, ending session");
            self.expire_if_current(retry.generation).await;
            return Err(ApiError::SessionExpired);
        }

        ApiClient::check_response(response).await
    }

    /// Refresh now, sharing the outcome with any refresh already in flight
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let generation = self.current_generation().await?;
        self.refresh_after(generation).await.map(|_| ())
    }

    /// Change the password; the backend may rotate the refresh token
    pub async fn change_password(
        &self,
        current_password: Option<&str>,
        new_password: &str,
    ) -> Result<Option<String>, ApiError> {
        let options = RequestOptions::post().json(&ChangePasswordRequest {
            current_password,
            new_password,
        })?;
        let response = self.authenticated_request(CHANGE_PASSWORD_PATH, options).await?;
        let body: ChangePasswordResponse = ApiClient::parse_json(response, "change password").await?;

        if let Some(refresh_token) = body.refresh_token.filter(|t| !t.is_empty()) {
            let rotated = {
                let mut inner = self.inner.write().await;
                let identity = inner.identity.clone();
                inner.credential.as_mut().map(|credential| {
                    credential.refresh_token = Some(refresh_token);
                    credential.refresh_expires_at = None;
                    (credential.clone(), identity)
                })
            };
            if let Some((credential, identity)) = rotated {
                if let Err(e) = self.store.save(&credential, identity.as_ref()) {
                    warn!(error = %e, "Failed to persist rotated refresh token");
                }
            }
        }

        Ok(body.message)
    }

    // ===== Internals =====

    async fn current_generation(&self) -> Result<u64, ApiError> {
        let inner = self.inner.read().await;
        match inner.credential {
            Some(_) => Ok(inner.generation),
            None => Err(ApiError::SessionExpired),
        }
    }

    /// Current token, refreshed first if it is about to expire
    async fn ensure_fresh_token(&self) -> Result<ActiveToken, ApiError> {
        let now = Utc::now();
        let (credential, generation) = {
            let inner = self.inner.read().await;
            match inner.credential {
                Some(ref credential) => (credential.clone(), inner.generation),
                None => return Err(ApiError::SessionExpired),
            }
        };

        if !credential.needs_refresh(now, self.refresh_leeway) {
            return Ok(ActiveToken {
                access_token: credential.access_token,
                generation,
                refreshed: false,
            });
        }

        if !credential.can_refresh(now) {
            if credential.is_expired(now) {
                debug!("Access token expired and no usable refresh token");
                self.expire_if_current(generation).await;
                return Err(ApiError::SessionExpired);
            }
            // Still valid for a little while; nothing better to send
            return Ok(ActiveToken {
                access_token: credential.access_token,
                generation,
                refreshed: false,
            });
        }

        debug!("Access token near expiry, refreshing proactively");
        self.refresh_after(generation).await
    }

    /// Single-flight refresh of the credential issued at `observed`
    async fn refresh_after(&self, observed: u64) -> Result<ActiveToken, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        let previous = {
            let inner = self.inner.read().await;
            match inner.credential {
                None => return Err(ApiError::SessionExpired),
                Some(ref credential) if inner.generation != observed => {
                    debug!("Credential already replaced, reusing it");
                    return Ok(ActiveToken {
                        access_token: credential.access_token.clone(),
                        generation: inner.generation,
                        refreshed: true,
                    });
                }
                Some(ref credential) => credential.clone(),
            }
        };

        let now = Utc::now();
        let refresh_token = match previous.refresh_token {
            Some(ref token) if previous.can_refresh(now) => token.clone(),
            _ => {
                debug!("No usable refresh token");
                self.expire_if_current(observed).await;
                return Err(ApiError::SessionExpired);
            }
        };

        self.set_state(SessionState::Refreshing);
        let pair = match self.api.refresh(&refresh_token).await {
            Ok(pair) => pair,
            Err(ApiError::SessionExpired) => {
                info!("Refresh token rejected, session expired");
                self.expire_if_current(observed).await;
                return Err(ApiError::SessionExpired);
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, keeping current session");
                self.restore_signed_in_state().await;
                return Err(e);
            }
        };

        match self.install_refreshed(pair, &previous, observed).await {
            Ok(token) => Ok(token),
            Err(e) => {
                self.restore_signed_in_state().await;
                Err(e)
            }
        }
    }

    /// Store a refreshed credential, unless the session changed meanwhile
    async fn install_refreshed(
        &self,
        pair: TokenPair,
        previous: &Credential,
        observed: u64,
    ) -> Result<ActiveToken, ApiError> {
        let now = Utc::now();
        let claims = decode_claims(&pair.access_token).ok();
        let credential = Credential::from_token_pair(
            pair,
            Some(previous),
            claims.as_ref(),
            now,
            self.default_access_ttl,
        )?;

        let fetched_identity = match self.api.me(&credential.access_token).await {
            Ok(user) => Some(Identity::from(user)),
            Err(e) => {
                debug!(error = %e, "Could not refresh profile, keeping cached identity");
                None
            }
        };

        let mut inner = self.inner.write().await;
        if inner.generation != observed {
            // Logged out or logged in again while the refresh was in flight
            let current = inner.credential.as_ref().map(|current| ActiveToken {
                access_token: current.access_token.clone(),
                generation: inner.generation,
                refreshed: true,
            });
            drop(inner);
            debug!("Session changed during refresh, discarding refreshed tokens");
            self.restore_signed_in_state().await;
            return current.ok_or(ApiError::SessionExpired);
        }

        if let Some(identity) = fetched_identity {
            inner.identity = Some(identity);
        }
        inner.credential = Some(credential.clone());
        inner.generation += 1;
        let generation = inner.generation;
        let identity = inner.identity.clone();
        drop(inner);

        if let Err(e) = self.store.save(&credential, identity.as_ref()) {
            warn!(error = %e, "Failed to persist refreshed session");
        }
        self.set_state(SessionState::SignedIn);
        debug!(?credential, "Session refreshed");

        Ok(ActiveToken {
            access_token: credential.access_token,
            generation,
            refreshed: true,
        })
    }

    /// Leave `Refreshing` for whatever the credential says now
    async fn restore_signed_in_state(&self) {
        let inner = self.inner.read().await;
        let state = match inner.credential {
            Some(_) => SessionState::SignedIn,
            None => SessionState::SignedOut,
        };
        self.set_state(state);
    }

    /// Clear the session if it is still the one issued at `generation`
    async fn expire_if_current(&self, generation: u64) {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            drop(inner);
            self.restore_signed_in_state().await;
            return;
        }
        inner.credential = None;
        inner.identity = None;
        inner.generation += 1;
        drop(inner);
        self.clear_storage();
        self.set_state(SessionState::SignedOut);
    }

    async fn clear_session(&self) {
        let mut inner = self.inner.write().await;
        inner.credential = None;
        inner.identity = None;
        inner.generation += 1;
        drop(inner);
        self.clear_storage();
        self.set_state(SessionState::SignedOut);
    }

    fn clear_storage(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "Session state changed");
        }
    }
}
