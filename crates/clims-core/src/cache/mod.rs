//! Local caching for offline display.
//!
//! `CacheManager` keeps JSON copies of the lookup lists and the last asset
//! page, considered stale after 60 minutes. `OptimisticList` holds a view's
//! list while edits are in flight. `AssetListView` pairs it with request
//! tickets for the asset list.

pub mod asset_view;
pub mod manager;
pub mod optimistic;

pub use asset_view::AssetListView;
pub use manager::{CacheAges, CacheManager, CachedData};
pub use optimistic::{Keyed, OptimisticList, Rollback};
