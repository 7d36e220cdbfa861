use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::api::Lookups;
use crate::models::{Asset, Page};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const LOOKUPS: &str = "lookups";
const ASSETS: &str = "assets";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// Offline copies of reference data and the last asset page.
///
/// Entries hold whatever the signed-in user was allowed to see, so the
/// whole directory is cleared on logout.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(self.cache_path(name), contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        Ok(())
    }

    // ===== Lookups =====

    pub fn load_lookups(&self) -> Result<Option<CachedData<Lookups>>> {
        self.load(LOOKUPS)
    }

    pub fn save_lookups(&self, lookups: &Lookups) -> Result<()> {
        self.save(LOOKUPS, lookups)
    }

    // ===== Assets =====

    pub fn load_assets(&self) -> Result<Option<CachedData<Page<Asset>>>> {
        self.load(ASSETS)
    }

    pub fn save_assets(&self, page: &Page<Asset>) -> Result<()> {
        self.save(ASSETS, page)
    }

    // ===== Housekeeping =====

    /// Remove every cached file
    pub fn clear(&self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).context("Failed to read cache directory"),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        debug!(dir = %self.cache_dir.display(), "Cache cleared");
        Ok(())
    }

    /// Helper to load cache and log errors without failing
    fn load_age<T>(&self, name: &str, loader: impl FnOnce() -> Result<Option<CachedData<T>>>) -> Option<String> {
        match loader() {
            Ok(Some(cached)) => Some(cached.age_display()),
            Ok(None) => None,
            Err(e) => {
                debug!(cache = name, error = %e, "Failed to load cache for age display");
                None
            }
        }
    }

    pub fn get_cache_ages(&self) -> CacheAges {
        CacheAges {
            lookups: self.load_age(LOOKUPS, || self.load_lookups()),
            assets: self.load_age(ASSETS, || self.load_assets()),
        }
    }

    /// Lookups older than the stale window (or missing) should be refetched
    pub fn lookups_stale(&self) -> bool {
        match self.load_lookups() {
            Ok(Some(cached)) => cached.is_stale(),
            Ok(None) => true,
            Err(e) => {
                debug!(error = %e, "Failed to load cache for staleness check");
                true
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheAges {
    pub lookups: Option<String>,
    pub assets: Option<String>,
}

impl CacheAges {
    pub fn assets_age(&self) -> String {
        self.assets.clone().unwrap_or_else(|| "never".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::Department;

    #[test]
    fn test_cached_data_age_display() {
        let mut cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(90);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::hours(26);
        assert_eq!(cached.age_display(), "1d ago");

        cached.cached_at = Utc::now() + Duration::minutes(5);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale());
    }

    #[test]
    fn test_lookups_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("clims")).unwrap();
        assert!(cache.load_lookups().unwrap().is_none());
        assert!(cache.lookups_stale());
        assert_eq!(cache.get_cache_ages().assets_age(), "never");

        let lookups = Lookups {
            departments: vec![Department {
                id: 1,
                name: "IT".to_string(),
            }],
            ..Default::default()
        };
        cache.save_lookups(&lookups).unwrap();

        let cached = cache.load_lookups().unwrap().expect("cached lookups");
        assert_eq!(cached.data.departments, lookups.departments);
        assert!(!cache.lookups_stale());
        assert_eq!(cache.get_cache_ages().lookups.as_deref(), Some("just now"));

        cache.clear().unwrap();
        assert!(cache.load_lookups().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("assets.json"), "{not json").unwrap();
        assert!(cache.load_assets().is_err());
        assert!(cache.get_cache_ages().assets.is_none());
    }
}
