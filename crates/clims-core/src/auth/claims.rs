//! Unverified decoding of access token claims.
//!
//! The client cannot check signatures (the key lives on the backend); it only
//! reads `exp` to schedule refreshes and `sub`/`roles` as a fallback identity.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::api::ApiError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    pub sub: Option<String>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    #[serde(default)]
    pub roles: RolesClaim,
}

/// `roles` is issued either as a plain string, a list of strings, or a list
/// of Spring authority objects (`{"authority": "ROLE_ADMIN"}`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum RolesClaim {
    #[default]
    Absent,
    Single(String),
    List(Vec<RoleEntry>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RoleEntry {
    Name(String),
    Authority { authority: String },
}

impl RolesClaim {
    /// Role names with any `ROLE_` prefix stripped
    pub fn names(&self) -> Vec<String> {
        let strip = |s: &str| s.strip_prefix("ROLE_").unwrap_or(s).to_string();
        match self {
            RolesClaim::Absent => vec![],
            RolesClaim::Single(s) => vec![strip(s)],
            RolesClaim::List(entries) => entries
                .iter()
                .map(|e| match e {
                    RoleEntry::Name(name) => strip(name),
                    RoleEntry::Authority { authority } => strip(authority),
                })
                .collect(),
        }
    }
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    pub fn primary_role(&self) -> Option<String> {
        self.roles.names().into_iter().next()
    }
}

/// Decode the payload segment of a compact JWT without verifying it
pub fn decode_claims(token: &str) -> Result<TokenClaims, ApiError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(ApiError::InvalidResponse("access token is not a JWT".to_string())),
    };

    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ApiError::InvalidResponse(format!("access token payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::InvalidResponse(format!("access token payload is not JSON: {}", e)))
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &serde_json::Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_claims() {
        let token = encode_test_token(&json!({"sub": "admin", "exp": 1_900_000_000, "roles": "ADMIN"}));
        let claims = decode_claims(&token).expect("decode");
        assert_eq!(claims.sub.as_deref(), Some("admin"));
        assert_eq!(claims.expires_at().map(|t| t.timestamp()), Some(1_900_000_000));
        assert_eq!(claims.primary_role().as_deref(), Some("ADMIN"));
    }

    #[test]
    fn test_spring_authority_roles() {
        let token = encode_test_token(&json!({
            "sub": "jdoe",
            "roles": [{"authority": "ROLE_MANAGER"}, {"authority": "ROLE_EMPLOYEE"}]
        }));
        let claims = decode_claims(&token).expect("decode");
        assert_eq!(claims.roles.names(), vec!["MANAGER", "EMPLOYEE"]);
        assert!(claims.expires_at().is_none());
    }

    #[test]
    fn test_rejects_non_jwt() {
        assert!(decode_claims("opaque-token").is_err());
        assert!(decode_claims("a.b").is_err());
        assert!(decode_claims("a.!!!.c").is_err());
        assert!(decode_claims("a.b.c.d").is_err());
    }
}
