//! JSON file-backed route store with atomic writes.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    tokio::fs,
    tracing::{debug, error, info},
};

use crate::{
    error::{Context, Result},
    routes::RouteMap,
    store::RouteStore,
};

/// Route table in a single JSON file: `owner_id -> route_name -> route`.
pub struct FileRouteStore {
    path: PathBuf,
}

impl FileRouteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Move an unparseable file out of the way so the next save starts fresh.
    async fn quarantine(&self) -> Result<PathBuf> {
        let backup = self.sibling(".bak");
        fs::rename(&self.path, &backup)
            .await
            .with_context(|| format!("failed to move {} aside", self.path.display()))?;
        Ok(backup)
    }
}

#[async_trait]
impl RouteStore for FileRouteStore {
    async fn load(&self) -> Result<RouteMap> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            info!(path = %self.path.display(), "no route file found, starting empty");
            return Ok(RouteMap::new());
        }
        let data = fs::read_to_string(&self.path).await?;
        match serde_json::from_str::<RouteMap>(&data) {
            Ok(routes) => {
                info!(
                    path = %self.path.display(),
                    routes = routes.values().map(|r| r.len()).sum::<usize>(),
                    "loaded routes"
                );
                Ok(routes)
            },
            Err(e) => {
                let backup = self.quarantine().await?;
                error!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "route file is corrupt, moved aside and starting empty"
                );
                Ok(RouteMap::new())
            },
        }
    }

    /// Atomic write: write to a temp file, then rename over the target.
    async fn save(&self, routes: &RouteMap) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(routes)?;
        let tmp = self.sibling(".tmp");
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "saved routes");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::routes::Route,
        std::collections::BTreeMap,
        tempfile::TempDir,
    };

    fn sample() -> RouteMap {
        let mut owner = BTreeMap::new();
        owner.insert("news".to_string(), Route::new(-1001, -1002));
        let mut map = RouteMap::new();
        map.insert(42, owner);
        map
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileRouteStore::new(dir.path().join("routes.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileRouteStore::new(dir.path().join("nested").join("routes.json"));
        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample());
        assert!(!dir.path().join("nested").join("routes.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileRouteStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());
        assert!(!path.exists());
        let backup = dir.path().join("routes.json.bak");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn reads_string_ids_written_by_older_versions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(
            &path,
            r#"{"42": {"news": {
                "source": "-1001", "destination": "-1002", "active": true,
                "remove_mentions": false, "blacklist": [], "block_urls": false,
                "blacklist_urls": [], "header_pattern": "", "footer_pattern": "",
                "custom_header": "", "custom_footer": "",
                "blocked_sentences": [], "blocked_image_hashes": []
            }}}"#,
        )
        .unwrap();

        let store = FileRouteStore::new(&path);
        assert_eq!(store.load().await.unwrap(), sample());
    }
}
