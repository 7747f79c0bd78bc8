use crate::gateway::ClusterGateway;
use crate::model::ResourceKind;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub const CACHE_FILE_NAME: &str = "traverse_cache.json";
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// On-disk copy of the discovered type catalog.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    path: PathBuf,
    ttl: Duration,
}

impl CatalogCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    /// `~/.kube/traverse_cache.json`
    pub fn in_home(ttl: Duration) -> Option<Self> {
        let home = std::env::var("HOME").ok().filter(|home| !home.is_empty())?;
        Some(Self::new(
            PathBuf::from(home).join(".kube").join(CACHE_FILE_NAME),
            ttl,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached catalog if it exists, parses and is younger than the TTL.
    pub fn load(&self) -> Option<Vec<ResourceKind>> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age > self.ttl {
            debug!("catalog cache {} is stale", self.path.display());
            return None;
        }

        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(kinds) => Some(kinds),
            Err(error) => {
                warn!("ignoring unreadable catalog cache: {error}");
                None
            }
        }
    }

    pub fn store(&self, kinds: &[ResourceKind]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string(kinds).context("failed to encode catalog")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Uses the cache when fresh, otherwise discovers and rewrites it. A failed
/// cache write is logged and ignored.
pub async fn load_catalog(
    gateway: &dyn ClusterGateway,
    cache: Option<&CatalogCache>,
    refresh: bool,
) -> Result<Vec<ResourceKind>> {
    if !refresh
        && let Some(cache) = cache
        && let Some(kinds) = cache.load()
    {
        info!(
            "loaded {} resource types from {}",
            kinds.len(),
            cache.path().display()
        );
        return Ok(kinds);
    }

    let kinds = gateway
        .list_types()
        .await
        .context("failed to discover resource types")?;
    info!("discovered {} resource types", kinds.len());

    if let Some(cache) = cache
        && let Err(error) = cache.store(&kinds)
    {
        warn!("{error:#}");
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::{CatalogCache, load_catalog};
    use crate::testing::{MockGateway, event_kind, pod_kind};
    use std::time::Duration;

    #[tokio::test]
    async fn discovery_result_is_cached_and_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CatalogCache::new(dir.path().join("cache.json"), Duration::from_secs(60));

        let gateway = MockGateway::with_kinds(vec![pod_kind(), event_kind()]);
        let kinds = load_catalog(&gateway, Some(&cache), false)
            .await
            .expect("catalog");
        assert_eq!(kinds.len(), 2);
        assert!(cache.path().exists());

        let empty = MockGateway::with_kinds(Vec::new());
        let cached = load_catalog(&empty, Some(&cache), false)
            .await
            .expect("cached");
        assert_eq!(cached, kinds);

        let refreshed = load_catalog(&empty, Some(&cache), true)
            .await
            .expect("refreshed");
        assert!(refreshed.is_empty());
    }

    #[test]
    fn stale_or_corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");

        let stale = CatalogCache::new(&path, Duration::ZERO);
        stale.store(&[pod_kind()]).expect("store");
        std::thread::sleep(Duration::from_millis(10));
        assert!(stale.load().is_none());

        std::fs::write(&path, "{not json").expect("write");
        let fresh = CatalogCache::new(&path, Duration::from_secs(60));
        assert!(fresh.load().is_none());
    }

    #[test]
    fn missing_cache_loads_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CatalogCache::new(dir.path().join("absent.json"), Duration::from_secs(60));
        assert!(cache.load().is_none());
    }
}
