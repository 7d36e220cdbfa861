use serde::{Deserialize, Serialize};

/// Default page size used by the backend list endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Default sort used by the backend list endpoints
pub const DEFAULT_SORT: &str = "id,desc";

/// Paginated list envelope returned by the list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(rename = "totalElements", default)]
    pub total_elements: u64,
    #[serde(rename = "totalPages", default)]
    pub total_pages: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.total_pages == 0 || self.page + 1 >= self.total_pages
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// "Page 2 of 5 (43 total)"
    pub fn summary(&self) -> String {
        format!(
            "Page {} of {} ({} total)",
            self.page + 1,
            self.total_pages.max(1),
            self.total_elements
        )
    }
}

/// Paging and sort parameters shared by every list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: String,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: DEFAULT_SORT.to_string(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
            ("sort".to_string(), self.sort.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        let json = r#"{"content":[1,2,3],"totalElements":23,"totalPages":3,"page":2,"size":10}"#;
        let page: Page<u32> = serde_json::from_str(json).expect("parse page");
        assert_eq!(page.content, vec![1, 2, 3]);
        assert!(page.is_last());
        assert_eq!(page.summary(), "Page 3 of 3 (23 total)");
    }

    #[test]
    fn test_empty_page() {
        let page: Page<u32> = serde_json::from_str(r#"{"content":[]}"#).expect("parse page");
        assert!(page.is_empty());
        assert!(page.is_last());
        assert_eq!(page.summary(), "Page 1 of 1 (0 total)");
    }

    #[test]
    fn test_page_request_query() {
        let query = PageRequest::new(1, 25).sorted_by("assetTag,asc").to_query();
        assert_eq!(query[0], ("page".to_string(), "1".to_string()));
        assert_eq!(query[1], ("size".to_string(), "25".to_string()));
        assert_eq!(query[2], ("sort".to_string(), "assetTag,asc".to_string()));
    }
}
