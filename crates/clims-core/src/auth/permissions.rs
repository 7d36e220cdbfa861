//! Role-based gating for UI affordances.
//!
//! These checks decide whether an action is offered at all; the backend
//! still enforces them and answers 403 (`ApiError::Forbidden`) otherwise.

use crate::models::{Asset, Role};

use super::session::Identity;

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    fn has_any_role(&self, roles: &[Role]) -> bool {
        self.role.map(|r| roles.contains(&r)).unwrap_or(false)
    }

    /// A manager acts only on assets of their own department
    fn manages_department_of(&self, asset: &Asset) -> bool {
        if !self.has_role(Role::Manager) {
            return false;
        }
        match (self.department.as_deref(), asset.department.as_deref()) {
            (Some(mine), Some(theirs)) => !mine.is_empty() && mine == theirs,
            _ => false,
        }
    }

    pub fn can_create_asset(&self) -> bool {
        self.has_any_role(&[Role::Admin, Role::ItStaff, Role::Manager])
    }

    pub fn can_edit_asset(&self, asset: &Asset) -> bool {
        self.has_any_role(&[Role::Admin, Role::ItStaff]) || self.manages_department_of(asset)
    }

    pub fn can_delete_asset(&self, asset: &Asset) -> bool {
        self.can_edit_asset(asset)
    }

    pub fn can_dispose_asset(&self, asset: &Asset) -> bool {
        self.has_any_role(&[Role::Admin, Role::ItStaff, Role::Finance])
            || self.manages_department_of(asset)
    }

    pub fn can_assign_asset(&self, asset: &Asset) -> bool {
        self.can_edit_asset(asset)
    }

    pub fn can_manage_users(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn can_export_reports(&self) -> bool {
        self.has_any_role(&[Role::Admin, Role::ItStaff, Role::Manager, Role::Finance])
    }

    /// Managers can only create assets in their own department
    pub fn locked_department(&self) -> Option<&str> {
        if self.has_role(Role::Manager) {
            self.department.as_deref()
        } else {
            None
        }
    }
}
