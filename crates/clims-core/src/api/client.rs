//! HTTP transport for the CLIMS REST API.
//!
//! `ApiClient` knows the base URL, attaches bearer tokens and maps error
//! statuses. It does not hold a session: the token is passed per call, and
//! the unauthenticated auth endpoints (login, refresh, logout) live here so
//! that the session manager can call them without recursing into itself.

use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::auth::TokenPair;
use crate::config::Config;
use crate::models::User;

use super::{ApiError, RequestOptions};

// ============================================================================
// Constants
// ============================================================================

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const ME_PATH: &str = "/api/auth/me";
pub const CHANGE_PASSWORD_PATH: &str = "/api/auth/change-password";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Body of `POST /api/auth/change-password` responses
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordResponse {
    pub message: Option<String>,
    /// Replacement refresh token; the backend revokes the old ones
    pub refresh_token: Option<String>,
}

/// API client for the CLIMS backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with the configured timeouts
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send a request and return the raw response, whatever its status
    pub async fn execute(
        &self,
        path: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let mut request = self
            .client
            .request(options.method.clone(), &url)
            .header(header::ACCEPT, options.accept.unwrap_or("application/json"));

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(ref body) = options.body {
            request = request.json(body);
        }

        debug!(method = %options.method, path, "Sending request");
        let response = request.send().await?;
        debug!(method = %options.method, path, status = %response.status(), "Response received");
        Ok(response)
    }

    /// Check if response is successful, returning an error with body if not.
    pub async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Parse a JSON body, reporting contract violations as `InvalidResponse`
    pub async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e)))
    }

    /// Exchange username/password for a token pair
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_login_status(status, &body));
        }

        Self::parse_json(response, "login").await
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// A rejected refresh token (400/401/403) is reported as `SessionExpired`;
    /// transport and server failures keep their own variants.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if matches!(status.as_u16(), 400 | 401 | 403) {
            debug!(status = %status, "Refresh token rejected");
            return Err(ApiError::SessionExpired);
        }

        let response = Self::check_response(response).await?;
        Self::parse_json(response, "refresh").await
    }

    /// Revoke a refresh token on the server
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        Self::check_response(response).await?;
        Ok(())
    }

    /// Fetch the profile behind an access token
    pub async fn me(&self, token: &str) -> Result<User, ApiError> {
        let response = self.execute(ME_PATH, &RequestOptions::get(), Some(token)).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, "me").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&Config::with_base_url(base)).expect("client")
    }

    #[test]
    fn test_url_joining() {
        let api = client("http://localhost:8080/");
        assert_eq!(api.base_url(), "http://localhost:8080");
        assert_eq!(api.url("/api/assets"), "http://localhost:8080/api/assets");
        assert_eq!(api.url("api/assets"), "http://localhost:8080/api/assets");
    }

    #[test]
    fn test_parse_change_password_response() {
        let body: ChangePasswordResponse =
            serde_json::from_str(r#"{"message":"Password changed","refreshToken":"r2"}"#).expect("parse");
        assert_eq!(body.message.as_deref(), Some("Password changed"));
        assert_eq!(body.refresh_token.as_deref(), Some("r2"));
    }
}
