//! Persistence trait for the route table.

use async_trait::async_trait;

use crate::{Result, routes::RouteMap};

/// Persistence backend for route configuration.
///
/// Implementations replace the whole stored table on every save.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Load the stored table. A missing or unreadable table loads as empty.
    async fn load(&self) -> Result<RouteMap>;
    async fn save(&self, routes: &RouteMap) -> Result<()>;
}
