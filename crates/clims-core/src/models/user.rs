use serde::{Deserialize, Serialize};

use super::page::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    ItStaff,
    Manager,
    Finance,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::ItStaff => "IT_STAFF",
            Role::Manager => "MANAGER",
            Role::Finance => "FINANCE",
            Role::Employee => "EMPLOYEE",
        }
    }

    /// Parse a wire role name, accepting a `ROLE_` prefix
    pub fn parse(s: &str) -> Option<Self> {
        let name = s.trim();
        let name = name.strip_prefix("ROLE_").unwrap_or(name);
        match name.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "IT_STAFF" => Some(Role::ItStaff),
            "MANAGER" => Some(Role::Manager),
            "FINANCE" => Some(Role::Finance),
            "EMPLOYEE" => Some(Role::Employee),
            _ => None,
        }
    }
}

/// Entry of the user directory (`UserResponse` on the backend)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Department name
    pub department: Option<String>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::parse)
    }
}

/// Body of `POST /api/users`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
}

/// Filters for `GET /api/users`
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub page: PageRequest,
    pub role: Option<Role>,
    pub department_id: Option<i64>,
    pub q: Option<String>,
}

impl UserQuery {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = self.page.to_query();
        if let Some(role) = self.role {
            query.push(("role".to_string(), role.as_str().to_string()));
        }
        if let Some(id) = self.department_id {
            query.push(("departmentId".to_string(), id.to_string()));
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            query.push(("q".to_string(), q.to_string()));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("ROLE_IT_STAFF"), Some(Role::ItStaff));
        assert_eq!(Role::parse("manager"), Some(Role::Manager));
        assert_eq!(Role::parse("AUDITOR"), None);
    }

    #[test]
    fn test_parse_user() {
        let json = r#"{"id":1,"username":"admin","email":"admin@clims.local","role":"ADMIN","department":"IT"}"#;
        let user: User = serde_json::from_str(json).expect("parse user");
        assert_eq!(user.role(), Some(Role::Admin));
        assert_eq!(user.department.as_deref(), Some("IT"));
    }

    #[test]
    fn test_new_user_body() {
        let body = serde_json::to_value(NewUser {
            username: "jdoe".to_string(),
            email: None,
            password: "S3cret!pw".to_string(),
            role: Some(Role::ItStaff),
            department_id: Some(4),
        })
        .expect("serialize");
        assert_eq!(body["role"], "IT_STAFF");
        assert_eq!(body["departmentId"], 4);
        assert!(body.get("email").is_none());
    }
}
