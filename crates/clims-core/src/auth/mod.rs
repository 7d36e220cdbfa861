//! Authentication: credentials, persistence and the session manager.
//!
//! - `SessionManager`: login, logout and refresh-on-401 for every call
//! - `SessionStore`: the persisted key set behind a `TokenStorage`
//! - `KeyringStorage` / `FileStorage`: where tokens live between runs
//!
//! Role checks for UI gating are implemented on `Identity`.

pub mod claims;
pub mod credentials;
pub mod manager;
pub mod permissions;
pub mod session;
pub mod storage;

pub use claims::{decode_claims, TokenClaims};
pub use credentials::KeyringStorage;
pub use manager::SessionManager;
pub use session::{keys, Credential, Identity, SessionState, SessionStore, TokenPair};
pub use storage::{open_storage, FileStorage, MemoryStorage, TokenStorage};
