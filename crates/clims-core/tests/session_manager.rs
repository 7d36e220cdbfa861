//! Session manager against a mock backend.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clims_core::api::{ApiError, InventoryClient, RequestOptions};
use clims_core::auth::{
    keys, Credential, FileStorage, MemoryStorage, SessionManager, SessionState, SessionStore,
    TokenStorage,
};
use clims_core::config::Config;
use clims_core::models::AssetQuery;

fn token_pair(access: &str, refresh: Option<&str>) -> serde_json::Value {
    let mut body = json!({
        "accessToken": access,
        "tokenType": "Bearer",
        "expiresIn": 900,
        "refreshExpiresIn": 604800,
    });
    if let Some(refresh) = refresh {
        body["refreshToken"] = json!(refresh);
    }
    body
}

fn admin_user() -> serde_json::Value {
    json!({"id": 1, "username": "admin", "email": "admin@clims.local", "role": "ADMIN", "department": "IT"})
}

fn empty_page() -> serde_json::Value {
    json!({"content": [], "totalElements": 0, "totalPages": 0, "page": 0, "size": 10})
}

fn seed(storage: Arc<dyn TokenStorage>, access_valid: bool) {
    let now = Utc::now();
    let access_expires_at = if access_valid {
        now + Duration::minutes(10)
    } else {
        now - Duration::minutes(1)
    };
    SessionStore::new(storage)
        .save(
            &Credential {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                access_expires_at,
                refresh_expires_at: Some(now + Duration::days(7)),
            },
            None,
        )
        .expect("seed session");
}

async fn manager(server: &MockServer, storage: Arc<dyn TokenStorage>) -> Arc<SessionManager> {
    let session = SessionManager::new(&Config::with_base_url(server.uri()), storage).expect("manager");
    session.init().await.expect("init");
    Arc::new(session)
}

async fn mount_me(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(admin_user()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_then_list_assets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "admin", "password": "Admin@123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("access-1", Some("refresh-1"))))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let session = manager(&server, storage.clone()).await;
    assert_eq!(session.state(), SessionState::SignedOut);

    let identity = session.login("admin", "Admin@123").await.expect("login");
    assert_eq!(identity.username, "admin");
    assert!(identity.can_manage_users());
    assert_eq!(session.state(), SessionState::SignedIn);
    assert_eq!(
        session.credential().await.map(|c| c.access_token),
        Some("access-1".to_string())
    );
    assert!(storage.keys().contains(&keys::USER_INFO.to_string()));

    let response = session
        .authenticated_request("/api/assets", RequestOptions::get())
        .await
        .expect("assets");
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_login_failures_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "admin", "password": "wrong"})))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Bad credentials"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "locked", "password": "x"})))
        .respond_with(ResponseTemplate::new(423).set_body_json(json!({"error": "Account locked for 15 minutes"})))
        .mount(&server)
        .await;

    let session = manager(&server, Arc::new(MemoryStorage::new())).await;

    let err = session.login("admin", "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidCredentials));

    match session.login("locked", "x").await.unwrap_err() {
        ApiError::AccountLocked(message) => assert!(message.contains("15 minutes")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!session.is_signed_in().await);
}

#[tokio::test]
async fn test_expired_access_refreshes_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("access-2", None)))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/hello"))
        .and(header("Authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn TokenStorage> = Arc::new(FileStorage::new(dir.path().to_path_buf()));
    seed(storage.clone(), false);

    let session = manager(&server, storage.clone()).await;
    assert_eq!(session.state(), SessionState::SignedIn);

    let response = session
        .authenticated_request("/api/hello", RequestOptions::get())
        .await
        .expect("hello");
    assert_eq!(response.text().await.unwrap(), "hello");

    // Rotation is optional: the old refresh token is kept
    let credential = session.credential().await.expect("credential");
    assert_eq!(credential.access_token, "access-2");
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));

    let stored = storage.get(keys::ACCESS_TOKEN).unwrap();
    assert_eq!(stored.as_deref(), Some("access-2"));
}

#[tokio::test]
async fn test_unauthorized_response_triggers_refresh_and_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("access-2", Some("refresh-2"))))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage.clone()).await;

    let inventory = InventoryClient::new(session.clone());
    let page = inventory.list_assets(&AssetQuery::default()).await.expect("assets");
    assert!(page.is_empty());

    assert_eq!(
        storage.get(keys::REFRESH_TOKEN).unwrap().as_deref(),
        Some("refresh-2")
    );
    assert_eq!(session.identity().await.map(|i| i.username), Some("admin".to_string()));
}

#[tokio::test]
async fn test_rejected_refresh_ends_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid refresh token"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = FileStorage::new(dir.path().to_path_buf());
    let session_file = file.path().to_path_buf();
    let storage: Arc<dyn TokenStorage> = Arc::new(file);
    seed(storage.clone(), false);
    assert!(session_file.exists());

    let session = manager(&server, storage.clone()).await;
    let mut states = session.subscribe();

    let err = session
        .authenticated_request("/api/assets", RequestOptions::get())
        .await
        .unwrap_err();
    assert!(err.is_session_expired());

    assert!(!session.is_signed_in().await);
    assert_eq!(*states.borrow_and_update(), SessionState::SignedOut);
    for key in keys::ALL {
        assert_eq!(storage.get(key).unwrap(), None, "{} should be removed", key);
    }
    assert!(!session_file.exists());

    // Later calls fail without touching the network
    let err = session
        .authenticated_request("/api/assets", RequestOptions::get())
        .await
        .unwrap_err();
    assert!(err.is_session_expired());
}

#[tokio::test]
async fn test_second_unauthorized_after_refresh_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("access-2", Some("refresh-2"))))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage.clone()).await;

    let err = session
        .authenticated_request("/api/assets", RequestOptions::get())
        .await
        .unwrap_err();
    assert!(err.is_session_expired());
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_refresh_server_error_keeps_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), false);
    let session = manager(&server, storage.clone()).await;

    let err = session
        .authenticated_request("/api/assets", RequestOptions::get())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ServerError(_)));
    assert_eq!(session.state(), SessionState::SignedIn);
    assert!(session.is_signed_in().await);
    assert!(!storage.keys().is_empty());
}

#[tokio::test]
async fn test_other_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/assets/7"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "Access denied"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("access-2", None)))
        .expect(0)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage).await;
    let inventory = InventoryClient::new(session.clone());

    match inventory.delete_asset(7).await.unwrap_err() {
        ApiError::Forbidden(message) => assert_eq!(message, "Access denied"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(session.is_signed_in().await);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_pair("access-2", Some("refresh-2")))
                .set_delay(StdDuration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(5)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage).await;

    let calls = (0..5).map(|_| {
        let session = session.clone();
        async move {
            session
                .authenticated_request("/api/assets", RequestOptions::get())
                .await
        }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.expect("request").status().as_u16(), 200);
    }
    assert_eq!(session.state(), SessionState::SignedIn);
}

#[tokio::test]
async fn test_logout_during_refresh_discards_new_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_pair("access-2", Some("refresh-2")))
                .set_delay(StdDuration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(0)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage.clone()).await;

    let request = session.authenticated_request("/api/assets", RequestOptions::get());
    let logout = async {
        tokio::time::sleep(StdDuration::from_millis(150)).await;
        session.logout().await;
    };
    let (result, ()) = tokio::join!(request, logout);

    assert!(result.unwrap_err().is_session_expired());
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(session.credential().await.is_none());
    assert!(session.identity().await.is_none());
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_proactive_and_reactive_refresh_are_shared() {
    let server = MockServer::start().await;
    // Slow enough that the second caller has started its refresh by the time this 401 lands
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401).set_delay(StdDuration::from_millis(1200)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_pair("access-2", Some("refresh-2")))
                .set_delay(StdDuration::from_millis(800)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/assets"))
        .and(header("Authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
        .expect(2)
        .mount(&server)
        .await;

    let config = Config::with_base_url(server.uri());
    let storage = Arc::new(MemoryStorage::new());
    // Outside the leeway now, inside it half a second from now
    let now = Utc::now();
    SessionStore::new(storage.clone())
        .save(
            &Credential {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                access_expires_at: now
                    + Duration::seconds(config.refresh_leeway_secs)
                    + Duration::milliseconds(500),
                refresh_expires_at: Some(now + Duration::days(7)),
            },
            None,
        )
        .expect("seed session");
    let session = SessionManager::new(&config, storage).expect("manager");
    session.init().await.expect("init");

    let reactive = session.authenticated_request("/api/assets", RequestOptions::get());
    let proactive = async {
        tokio::time::sleep(StdDuration::from_millis(800)).await;
        session
            .authenticated_request("/api/assets", RequestOptions::get())
            .await
    };
    let (reactive, proactive) = tokio::join!(reactive, proactive);

    assert_eq!(reactive.expect("reactive request").status().as_u16(), 200);
    assert_eq!(proactive.expect("proactive request").status().as_u16(), 200);
    assert_eq!(
        session.credential().await.map(|c| c.access_token),
        Some("access-2".to_string())
    );
    assert_eq!(session.state(), SessionState::SignedIn);
}

#[tokio::test]
async fn test_out_of_range_token_lifetime_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "a",
            "refreshToken": "r",
            "expiresIn": i64::MAX,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let session = manager(&server, storage.clone()).await;

    let err = session.login("admin", "Admin@123").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
    assert!(!session.is_signed_in().await);
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_logout_clears_even_when_revoke_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage.clone()).await;
    assert!(session.is_signed_in().await);

    session.logout().await;

    assert!(!session.is_signed_in().await);
    assert_eq!(session.state(), SessionState::SignedOut);
    assert!(session.identity().await.is_none());
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_change_password_rotates_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/change-password"))
        .and(header("Authorization", "Bearer access-1"))
        .and(body_json(json!({"currentPassword": "Admin@123", "newPassword": "N3w-Secret!"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": "Password changed", "refreshToken": "refresh-9"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage.clone()).await;

    let message = session
        .change_password(Some("Admin@123"), "N3w-Secret!")
        .await
        .expect("change password");
    assert_eq!(message.as_deref(), Some("Password changed"));

    let credential = session.credential().await.expect("credential");
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-9"));
    assert_eq!(credential.access_token, "access-1");
    assert_eq!(
        storage.get(keys::REFRESH_TOKEN).unwrap().as_deref(),
        Some("refresh-9")
    );
}

#[tokio::test]
async fn test_lookups_fetch_concurrently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/lookups/departments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "IT"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/lookups/locations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 2, "name": "HQ", "building": "A", "room": "101"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/lookups/vendors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage).await;

    let lookups = InventoryClient::new(session).lookups().await.expect("lookups");
    assert_eq!(lookups.departments.len(), 1);
    assert_eq!(lookups.locations[0].display_name(), "HQ (Building A, Room 101)");
    assert!(lookups.vendors.is_empty());
}

#[tokio::test]
async fn test_export_returns_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/reports/inventory/csv"))
        .and(header("Accept", "text/csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"id,tag\n1,LAP-001\n".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    seed(storage.clone(), true);
    let session = manager(&server, storage).await;

    let bytes = InventoryClient::new(session)
        .export_inventory(
            clims_core::models::ExportFormat::Csv,
            &clims_core::models::InventoryFilter::default(),
        )
        .await
        .expect("export");
    assert_eq!(bytes, b"id,tag\n1,LAP-001\n");
}
