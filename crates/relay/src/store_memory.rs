//! In-memory route store for tests and dry runs.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Result, routes::RouteMap, store::RouteStore};

/// Keeps the last saved table in memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryRouteStore {
    routes: Mutex<RouteMap>,
    saves: Mutex<usize>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: RouteMap) -> Self {
        Self {
            routes: Mutex::new(routes),
            saves: Mutex::new(0),
        }
    }

    /// Last saved table.
    #[must_use]
    pub fn routes(&self) -> RouteMap {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of saves so far.
    #[must_use]
    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn load(&self) -> Result<RouteMap> {
        Ok(self.routes())
    }

    async fn save(&self, routes: &RouteMap) -> Result<()> {
        *self.routes.lock().unwrap_or_else(|e| e.into_inner()) = routes.clone();
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
