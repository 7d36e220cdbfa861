use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::page::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Available,
    Assigned,
    Maintenance,
    UnderRepair,
    Retired,
}

impl AssetStatus {
    pub const ALL: [AssetStatus; 5] = [
        AssetStatus::Available,
        AssetStatus::Assigned,
        AssetStatus::Maintenance,
        AssetStatus::UnderRepair,
        AssetStatus::Retired,
    ];

    /// Wire name, as used in query strings
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Available => "AVAILABLE",
            AssetStatus::Assigned => "ASSIGNED",
            AssetStatus::Maintenance => "MAINTENANCE",
            AssetStatus::UnderRepair => "UNDER_REPAIR",
            AssetStatus::Retired => "RETIRED",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AssetStatus::Available => "Available",
            AssetStatus::Assigned => "Assigned",
            AssetStatus::Maintenance => "Maintenance",
            AssetStatus::UnderRepair => "Under repair",
            AssetStatus::Retired => "Retired",
        }
    }
}

impl std::str::FromStr for AssetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown asset status: {}", s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Laptop,
    Desktop,
    Monitor,
    Printer,
    Phone,
    Tablet,
    Server,
    Network,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: i64,
    pub asset_tag: Option<String>,
    pub serial_number: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub status: Option<AssetStatus>,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    /// Username of the assignee
    pub assigned_to: Option<String>,
    pub location: Option<String>,
    pub vendor: Option<String>,
    pub department_id: Option<i64>,
    pub department: Option<String>,
}

impl Asset {
    /// Tag if assigned, otherwise "Asset <id>"
    pub fn label(&self) -> String {
        self.asset_tag
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Asset {}", self.id))
    }

    pub fn make_model(&self) -> String {
        match (self.make.as_deref(), self.model.as_deref()) {
            (Some(make), Some(model)) => format!("{} {}", make, model),
            (Some(v), None) | (None, Some(v)) => v.to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to.is_some() || self.status == Some(AssetStatus::Assigned)
    }
}

/// Body of `POST /api/assets`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub serial_number: String,
    pub make: String,
    pub model: String,
    pub purchase_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_expiry_date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
}

impl NewAsset {
    /// Mirror of the backend rule for serial numbers: `^[A-Za-z0-9_-]+$`
    pub fn validate(&self) -> Result<(), String> {
        if self.serial_number.is_empty()
            || !self
                .serial_number
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err("serialNumber contains invalid characters".to_string());
        }
        if self.make.trim().is_empty() {
            return Err("make is required".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("model is required".to_string());
        }
        Ok(())
    }
}

/// Body of `PUT /api/assets/{id}`; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_expiry_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AssetStatus>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
}

/// Body of `POST /api/assets/{id}/assign`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignAsset {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<i64>,
}

/// Filters for `GET /api/assets`
#[derive(Debug, Clone, Default)]
pub struct AssetQuery {
    pub page: PageRequest,
    pub status: Option<AssetStatus>,
    pub assigned_user_id: Option<i64>,
    pub department_id: Option<i64>,
    pub location_id: Option<i64>,
    pub vendor_id: Option<i64>,
    /// Free-text search
    pub q: Option<String>,
}

impl AssetQuery {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = self.page.to_query();
        if let Some(status) = self.status {
            query.push(("status".to_string(), status.as_str().to_string()));
        }
        let ids = [
            ("assignedUserId", self.assigned_user_id),
            ("departmentId", self.department_id),
            ("locationId", self.location_id),
            ("vendorId", self.vendor_id),
        ];
        for (name, value) in ids {
            if let Some(id) = value {
                query.push((name.to_string(), id.to_string()));
            }
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            query.push(("q".to_string(), q.to_string()));
        }
        query
    }
}

/// One row of `GET /api/assets/{id}/audit`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub details: Option<String>,
    #[serde(alias = "username")]
    pub user: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}
