//! REST API access for the CLIMS backend.
//!
//! `ApiClient` is the bare transport plus the unauthenticated auth
//! endpoints. Everything else goes through `InventoryClient`, which sends
//! its calls via the session manager so that an expired access token is
//! refreshed transparently.

pub mod client;
pub mod error;
pub mod generation;
pub mod inventory;
pub mod request;

pub use client::{ApiClient, ChangePasswordResponse};
pub use error::ApiError;
pub use generation::{RequestGeneration, Ticket};
pub use inventory::{InventoryClient, Lookups};
pub use request::RequestOptions;
