use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub building: Option<String>,
    pub room: Option<String>,
}

impl Location {
    /// "HQ (Building A, Room 101)"
    pub fn display_name(&self) -> String {
        let detail: Vec<String> = [
            self.building.as_deref().map(|b| format!("Building {}", b)),
            self.room.as_deref().map(|r| format!("Room {}", r)),
        ]
        .into_iter()
        .flatten()
        .collect();

        if detail.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, detail.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    #[serde(rename = "contactNumber")]
    pub contact_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}
