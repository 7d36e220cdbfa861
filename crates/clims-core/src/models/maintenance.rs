use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::page::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceStatus {
    Reported,
    Scheduled,
    InProgress,
    Resolved,
    Completed,
    Cancelled,
}

impl MaintenanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceStatus::Reported => "REPORTED",
            MaintenanceStatus::Scheduled => "SCHEDULED",
            MaintenanceStatus::InProgress => "IN_PROGRESS",
            MaintenanceStatus::Resolved => "RESOLVED",
            MaintenanceStatus::Completed => "COMPLETED",
            MaintenanceStatus::Cancelled => "CANCELLED",
        }
    }

    /// Closed records no longer count as open work
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            MaintenanceStatus::Resolved | MaintenanceStatus::Completed | MaintenanceStatus::Cancelled
        )
    }

    /// Whether the backend lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: MaintenanceStatus) -> bool {
        use MaintenanceStatus::*;
        match self {
            Reported => matches!(next, Scheduled | InProgress | Cancelled),
            Scheduled => matches!(next, InProgress | Cancelled),
            InProgress => matches!(next, Resolved | Completed | Cancelled),
            Resolved => matches!(next, Completed),
            Completed | Cancelled => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecord {
    pub id: i64,
    pub asset_id: Option<i64>,
    pub asset_tag: Option<String>,
    pub description: Option<String>,
    pub status: Option<MaintenanceStatus>,
    pub scheduled_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    /// Username of the reporter
    pub reported_by: Option<String>,
}

impl MaintenanceRecord {
    pub fn is_open(&self) -> bool {
        self.status.map(|s| !s.is_closed()).unwrap_or(true)
    }
}

/// Body of `POST /api/maintenance`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMaintenance {
    pub asset_id: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
}

/// Body of `PATCH /api/maintenance/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatusUpdate {
    pub status: MaintenanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<NaiveDate>,
}

/// Filters for `GET /api/maintenance` and `GET /api/assets/{id}/maintenance`
#[derive(Debug, Clone, Default)]
pub struct MaintenanceQuery {
    pub page: PageRequest,
    pub status: Option<MaintenanceStatus>,
    pub asset_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl MaintenanceQuery {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = self.page.to_query();
        if let Some(status) = self.status {
            query.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(id) = self.asset_id {
            query.push(("assetId".to_string(), id.to_string()));
        }
        if let Some(from) = self.date_from {
            query.push(("dateFrom".to_string(), from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.date_to {
            query.push(("dateTo".to_string(), to.format("%Y-%m-%d").to_string()));
        }
        query
    }
}
