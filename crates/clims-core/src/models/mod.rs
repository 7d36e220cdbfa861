//! Data models for CLIMS entities.
//!
//! This module contains the request and response types exchanged with the
//! CLIMS backend:
//!
//! - `Asset` and its request types, `AssetStatus`, `AssetType`
//! - `User`, `Role` and the admin request types
//! - Reference data: `Department`, `Location`, `Vendor`
//! - `MaintenanceRecord`, `MaintenanceStatus`
//! - Reporting: `Kpis`, `InventoryFilter`, `MaintenanceFilter`, `ExportFormat`
//! - `Page<T>`: the paginated list envelope

pub mod asset;
pub mod lookup;
pub mod maintenance;
pub mod page;
pub mod report;
pub mod user;

pub use asset::{AssetUpdate, Asset, AssetQuery, AssetStatus, AssetType, AssignAsset, AuditEntry, NewAsset};
pub use lookup::{Department, Location, Vendor};
pub use maintenance::{MaintenanceQuery, MaintenanceRecord, MaintenanceStatus, MaintenanceStatusUpdate, NewMaintenance};
pub use page::{Page, PageRequest};
pub use report::{ExportFormat, InventoryFilter, Kpis, MaintenanceFilter};
pub use user::{NewUser, Role, User, UserQuery};
