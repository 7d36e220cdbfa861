//! Typed endpoints of the CLIMS backend.
//!
//! Every call goes through `SessionManager::authenticated_request`, so an
//! expired access token is refreshed once and the call retried. Any other
//! failure is returned to the caller as-is.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::SessionManager;
use crate::models::{
    Asset, AssetQuery, AssetUpdate, AssignAsset, AuditEntry, Department, ExportFormat,
    InventoryFilter, Kpis, Location, MaintenanceFilter, MaintenanceQuery, MaintenanceRecord,
    MaintenanceStatusUpdate, NewAsset, NewMaintenance, NewUser, Page, PageRequest, Role, User,
    UserQuery, Vendor,
};

use super::{ApiClient, ApiError, RequestOptions};

/// All reference data used by the asset forms
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lookups {
    pub departments: Vec<Department>,
    pub locations: Vec<Location>,
    pub vendors: Vec<Vendor>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest<'a> {
    new_password: &'a str,
}

#[derive(Serialize)]
struct RoleUpdate {
    role: Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DepartmentUpdate {
    department_id: Option<i64>,
}

#[derive(Serialize)]
struct DisposeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Clone is cheap; clones share the session.
#[derive(Clone)]
pub struct InventoryClient {
    session: Arc<SessionManager>,
}

impl InventoryClient {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
        what: &str,
    ) -> Result<T, ApiError> {
        let response = self.session.authenticated_request(path, options).await?;
        ApiClient::parse_json(response, what).await
    }

    async fn send(&self, path: &str, options: RequestOptions) -> Result<(), ApiError> {
        self.session.authenticated_request(path, options).await?;
        Ok(())
    }

    // ===== Assets =====

    pub async fn list_assets(&self, query: &AssetQuery) -> Result<Page<Asset>, ApiError> {
        let page: Page<Asset> = self
            .fetch("/api/assets", RequestOptions::get().queries(query.to_query()), "assets")
            .await?;
        debug!(count = page.content.len(), total = page.total_elements, "Fetched assets");
        Ok(page)
    }

    pub async fn get_asset(&self, id: i64) -> Result<Asset, ApiError> {
        self.fetch(&format!("/api/assets/{}", id), RequestOptions::get(), "asset")
            .await
    }

    pub async fn create_asset(&self, asset: &NewAsset) -> Result<Asset, ApiError> {
        asset.validate().map_err(ApiError::Validation)?;
        self.fetch("/api/assets", RequestOptions::post().json(asset)?, "create asset")
            .await
    }

    pub async fn update_asset(&self, id: i64, update: &AssetUpdate) -> Result<Asset, ApiError> {
        self.fetch(
            &format!("/api/assets/{}", id),
            RequestOptions::put().json(update)?,
            "update asset",
        )
        .await
    }

    pub async fn delete_asset(&self, id: i64) -> Result<(), ApiError> {
        self.send(&format!("/api/assets/{}", id), RequestOptions::delete())
            .await
    }

    pub async fn assign_asset(&self, id: i64, assignment: &AssignAsset) -> Result<Asset, ApiError> {
        self.fetch(
            &format!("/api/assets/{}/assign", id),
            RequestOptions::post().json(assignment)?,
            "assign asset",
        )
        .await
    }

    pub async fn unassign_asset(&self, id: i64) -> Result<Asset, ApiError> {
        self.fetch(
            &format!("/api/assets/{}/unassign", id),
            RequestOptions::post(),
            "unassign asset",
        )
        .await
    }

    pub async fn dispose_asset(&self, id: i64, reason: Option<&str>) -> Result<Asset, ApiError> {
        self.fetch(
            &format!("/api/assets/{}/dispose", id),
            RequestOptions::post().json(&DisposeRequest { reason })?,
            "dispose asset",
        )
        .await
    }

    pub async fn asset_maintenance(
        &self,
        id: i64,
        page: &PageRequest,
    ) -> Result<Page<MaintenanceRecord>, ApiError> {
        self.fetch(
            &format!("/api/assets/{}/maintenance", id),
            RequestOptions::get().queries(page.to_query()),
            "asset maintenance",
        )
        .await
    }

    pub async fn asset_audit(&self, id: i64) -> Result<Vec<AuditEntry>, ApiError> {
        self.fetch(
            &format!("/api/assets/{}/audit", id),
            RequestOptions::get(),
            "asset audit",
        )
        .await
    }

    // ===== Users =====

    pub async fn list_users(&self, query: &UserQuery) -> Result<Page<User>, ApiError> {
        self.fetch("/api/users", RequestOptions::get().queries(query.to_query()), "users")
            .await
    }

    pub async fn get_user(&self, id: i64) -> Result<User, ApiError> {
        self.fetch(&format!("/api/users/{}", id), RequestOptions::get(), "user")
            .await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<User, ApiError> {
        self.fetch("/api/users", RequestOptions::post().json(user)?, "create user")
            .await
    }

    pub async fn reset_password(&self, id: i64, new_password: &str) -> Result<(), ApiError> {
        self.send(
            &format!("/api/users/{}/reset-password", id),
            RequestOptions::post().json(&ResetPasswordRequest { new_password })?,
        )
        .await
    }

    pub async fn update_role(&self, id: i64, role: Role) -> Result<User, ApiError> {
        self.fetch(
            &format!("/api/users/{}/role", id),
            RequestOptions::patch().json(&RoleUpdate { role })?,
            "update role",
        )
        .await
    }

    pub async fn update_department(
        &self,
        id: i64,
        department_id: Option<i64>,
    ) -> Result<User, ApiError> {
        self.fetch(
            &format!("/api/users/{}/department", id),
            RequestOptions::patch().json(&DepartmentUpdate { department_id })?,
            "update department",
        )
        .await
    }

    pub async fn unlock_user(&self, id: i64) -> Result<(), ApiError> {
        self.send(&format!("/api/users/{}/unlock", id), RequestOptions::post())
            .await
    }

    // ===== Lookups =====

    pub async fn departments(&self) -> Result<Vec<Department>, ApiError> {
        self.fetch("/api/lookups/departments", RequestOptions::get(), "departments")
            .await
    }

    pub async fn locations(&self) -> Result<Vec<Location>, ApiError> {
        self.fetch("/api/lookups/locations", RequestOptions::get(), "locations")
            .await
    }

    pub async fn vendors(&self) -> Result<Vec<Vendor>, ApiError> {
        self.fetch("/api/lookups/vendors", RequestOptions::get(), "vendors")
            .await
    }

    /// Fetch all three lookup lists concurrently
    pub async fn lookups(&self) -> Result<Lookups, ApiError> {
        let (departments, locations, vendors) =
            futures::try_join!(self.departments(), self.locations(), self.vendors())?;
        Ok(Lookups {
            departments,
            locations,
            vendors,
        })
    }

    // ===== Maintenance =====

    pub async fn list_maintenance(
        &self,
        query: &MaintenanceQuery,
    ) -> Result<Page<MaintenanceRecord>, ApiError> {
        self.fetch(
            "/api/maintenance",
            RequestOptions::get().queries(query.to_query()),
            "maintenance",
        )
        .await
    }

    pub async fn get_maintenance(&self, id: i64) -> Result<MaintenanceRecord, ApiError> {
        self.fetch(
            &format!("/api/maintenance/{}", id),
            RequestOptions::get(),
            "maintenance record",
        )
        .await
    }

    pub async fn create_maintenance(
        &self,
        record: &NewMaintenance,
    ) -> Result<MaintenanceRecord, ApiError> {
        if record.description.trim().is_empty() {
            return Err(ApiError::Validation("description is required".to_string()));
        }
        self.fetch(
            "/api/maintenance",
            RequestOptions::post().json(record)?,
            "create maintenance",
        )
        .await
    }

    pub async fn update_maintenance_status(
        &self,
        id: i64,
        update: &MaintenanceStatusUpdate,
    ) -> Result<MaintenanceRecord, ApiError> {
        self.fetch(
            &format!("/api/maintenance/{}/status", id),
            RequestOptions::patch().json(update)?,
            "maintenance status",
        )
        .await
    }

    // ===== Reports =====

    pub async fn kpis(&self) -> Result<Kpis, ApiError> {
        self.fetch("/api/reports/kpis", RequestOptions::get(), "kpis")
            .await
    }

    pub async fn export_inventory(
        &self,
        format: ExportFormat,
        filter: &InventoryFilter,
    ) -> Result<Vec<u8>, ApiError> {
        self.export("inventory", format, filter).await
    }

    pub async fn export_maintenance(
        &self,
        format: ExportFormat,
        filter: &MaintenanceFilter,
    ) -> Result<Vec<u8>, ApiError> {
        self.export("maintenance", format, filter).await
    }

    async fn export<F: Serialize>(
        &self,
        report: &str,
        format: ExportFormat,
        filter: &F,
    ) -> Result<Vec<u8>, ApiError> {
        let path = format!("/api/reports/{}/{}", report, format.path_segment());
        let options = RequestOptions::post().json(filter)?.accept(format.accept());
        let response = self.session.authenticated_request(&path, options).await?;
        let bytes = response.bytes().await?;
        debug!(report, bytes = bytes.len(), "Export downloaded");
        Ok(bytes.to_vec())
    }
}
