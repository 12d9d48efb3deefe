//! Route table: owner-scoped named routes with compiled filter rules.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, RwLock},
};

use {
    ferry_common::{ChatId, OwnerId, RouteKey},
    ferry_filters::{CompiledRules, FilterSettings},
    serde::{Deserialize, Deserializer, Serialize},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    stats::RouteStats,
    store::RouteStore,
};

/// Stored layout: `owner_id -> route_name -> route`.
pub type RouteMap = BTreeMap<OwnerId, BTreeMap<String, Route>>;

/// One source-to-destination forwarding rule as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(deserialize_with = "chat_id")]
    pub source: ChatId,
    #[serde(deserialize_with = "chat_id")]
    pub destination: ChatId,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(flatten)]
    pub filters: FilterSettings,
}

fn default_active() -> bool {
    true
}

/// Chat ids were written as strings by older versions.
fn chat_id<'de, D>(deserializer: D) -> std::result::Result<ChatId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(ChatId),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Int(id) => Ok(id),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl Route {
    /// Active route with empty filter settings.
    pub fn new(source: ChatId, destination: ChatId) -> Self {
        Self {
            source,
            destination,
            active: true,
            filters: FilterSettings::default(),
        }
    }
}

/// A route together with its compiled rules. Immutable once built; any
/// change produces a new entry.
#[derive(Debug)]
pub struct RouteEntry {
    pub key: RouteKey,
    pub route: Route,
    pub rules: CompiledRules,
}

impl RouteEntry {
    pub fn build(key: RouteKey, route: Route) -> Result<Self> {
        let rules = CompiledRules::compile(&route.filters)?;
        Ok(Self { key, route, rules })
    }
}

/// Change to a route's configuration applied by an admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMutation {
    SetActive(bool),
    ToggleRemoveMentions,
    AddBlacklistWords(Vec<String>),
    ClearBlacklist,
    ToggleBlockUrls,
    AddUrlBlacklist(Vec<String>),
    ClearUrlBlacklist,
    SetHeaderPattern(String),
    SetFooterPattern(String),
    ClearHeaderFooter,
    SetCustomHeader(String),
    SetCustomFooter(String),
    ClearCustomHeaderFooter,
    AddBlockedSentence(String),
    ClearBlockedSentences,
    AddBlockedImage(String),
    ClearBlockedImages,
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl RouteMutation {
    fn apply(self, route: &mut Route) {
        let f = &mut route.filters;
        match self {
            Self::SetActive(active) => route.active = active,
            Self::ToggleRemoveMentions => f.remove_mentions = !f.remove_mentions,
            Self::AddBlacklistWords(words) => f.blacklist_words.extend(words),
            Self::ClearBlacklist => f.blacklist_words.clear(),
            Self::ToggleBlockUrls => f.block_urls = !f.block_urls,
            Self::AddUrlBlacklist(urls) => f.blacklisted_url_substrings.extend(urls),
            Self::ClearUrlBlacklist => f.blacklisted_url_substrings.clear(),
            Self::SetHeaderPattern(p) => f.header_pattern = non_empty(p),
            Self::SetFooterPattern(p) => f.footer_pattern = non_empty(p),
            Self::ClearHeaderFooter => {
                f.header_pattern = None;
                f.footer_pattern = None;
            },
            Self::SetCustomHeader(h) => f.custom_header = non_empty(h),
            Self::SetCustomFooter(h) => f.custom_footer = non_empty(h),
            Self::ClearCustomHeaderFooter => {
                f.custom_header = None;
                f.custom_footer = None;
            },
            Self::AddBlockedSentence(s) => {
                f.blocked_sentences.insert(s);
            },
            Self::ClearBlockedSentences => f.blocked_sentences.clear(),
            Self::AddBlockedImage(hash) => {
                f.blocked_image_fingerprints.insert(hash.to_ascii_lowercase());
            },
            Self::ClearBlockedImages => f.blocked_image_fingerprints.clear(),
        }
    }
}

type RouteIndex = BTreeMap<OwnerId, BTreeMap<String, Arc<RouteEntry>>>;

/// Live route table shared by the intake path, workers and admin commands.
///
/// Readers get `Arc<RouteEntry>` snapshots; writers swap in a freshly built
/// entry, so a job already holding an entry keeps a consistent view.
pub struct RouteTable {
    routes: RwLock<RouteIndex>,
    stats: Mutex<HashMap<RouteKey, RouteStats>>,
    store: Arc<dyn RouteStore>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl RouteTable {
    /// Load the table from `store`.
    ///
    /// A stored route whose filters do not compile is kept but deactivated.
    pub async fn load(store: Arc<dyn RouteStore>) -> Result<Self> {
        let stored = store.load().await?;
        let mut index = RouteIndex::new();
        let mut stats = HashMap::new();
        for (owner_id, routes) in stored {
            for (name, route) in routes {
                let key = RouteKey::new(owner_id, name.clone());
                let entry = match RouteEntry::build(key.clone(), route.clone()) {
                    Ok(entry) => entry,
                    Err(e) => {
                        error!(route = %key, error = %e, "route filters do not compile, loading it paused");
                        RouteEntry {
                            key: key.clone(),
                            route: Route {
                                active: false,
                                ..route
                            },
                            rules: CompiledRules::passthrough(),
                        }
                    },
                };
                stats.insert(key, RouteStats::default());
                index.entry(owner_id).or_default().insert(name, Arc::new(entry));
            }
        }
        info!(routes = stats.len(), "route table ready");
        Ok(Self {
            routes: RwLock::new(index),
            stats: Mutex::new(stats),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RouteIndex> {
        self.routes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RouteIndex> {
        self.routes.write().unwrap_or_else(|e| e.into_inner())
    }

    fn stats_lock(&self) -> std::sync::MutexGuard<'_, HashMap<RouteKey, RouteStats>> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// First active route (in owner, then name order) reading from `chat_id`.
    #[must_use]
    pub fn match_source(&self, chat_id: ChatId) -> Option<Arc<RouteEntry>> {
        self.read()
            .values()
            .flat_map(|routes| routes.values())
            .find(|entry| entry.route.active && entry.route.source == chat_id)
            .cloned()
    }

    #[must_use]
    pub fn get(&self, key: &RouteKey) -> Option<Arc<RouteEntry>> {
        self.read()
            .get(&key.owner_id)
            .and_then(|routes| routes.get(&key.name))
            .cloned()
    }

    #[must_use]
    pub fn is_active(&self, key: &RouteKey) -> bool {
        self.get(key).is_some_and(|e| e.route.active)
    }

    /// Routes of one owner, ordered by name.
    #[must_use]
    pub fn routes_of(&self, owner_id: OwnerId) -> Vec<Arc<RouteEntry>> {
        self.read()
            .get(&owner_id)
            .map(|routes| routes.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn all(&self) -> Vec<Arc<RouteEntry>> {
        self.read()
            .values()
            .flat_map(|routes| routes.values().cloned())
            .collect()
    }

    #[must_use]
    pub fn owners(&self) -> Vec<OwnerId> {
        self.read().keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create or replace a route. Its counters start from zero.
    pub async fn upsert(&self, key: RouteKey, route: Route) -> Result<Arc<RouteEntry>> {
        let entry = Arc::new(RouteEntry::build(key.clone(), route)?);
        self.write()
            .entry(key.owner_id)
            .or_default()
            .insert(key.name.clone(), Arc::clone(&entry));
        self.stats_lock().insert(key.clone(), RouteStats::default());
        info!(route = %key, source = entry.route.source, destination = entry.route.destination, "route saved");
        self.persist().await;
        Ok(entry)
    }

    /// Apply `mutation`, recompile the route's rules and persist.
    ///
    /// On a compile error the route is left unchanged.
    pub async fn mutate(&self, key: &RouteKey, mutation: RouteMutation) -> Result<Arc<RouteEntry>> {
        let entry = self
            .update(key, mutation, |_| true)?
            .ok_or_else(|| Error::route_not_found(key))?;
        self.persist().await;
        Ok(entry)
    }

    /// Pause a route after a permanent destination failure. Returns `false`
    /// when it was already paused or no longer exists.
    pub async fn disable(&self, key: &RouteKey) -> bool {
        match self.update(key, RouteMutation::SetActive(false), |route| route.active) {
            Ok(Some(_)) => {
                warn!(route = %key, "route disabled");
                self.persist().await;
                true
            },
            Ok(None) => false,
            Err(e) => {
                warn!(route = %key, error = %e, "failed to disable route");
                false
            },
        }
    }

    /// Swap in the mutated entry under one write guard. `None` when the
    /// route is missing or `applies` rejects its current state.
    fn update(
        &self,
        key: &RouteKey,
        mutation: RouteMutation,
        applies: impl FnOnce(&Route) -> bool,
    ) -> Result<Option<Arc<RouteEntry>>> {
        let mut routes = self.write();
        let Some(slot) = routes
            .get_mut(&key.owner_id)
            .and_then(|r| r.get_mut(&key.name))
        else {
            return Ok(None);
        };
        if !applies(&slot.route) {
            return Ok(None);
        }
        let mut route = slot.route.clone();
        debug!(route = %key, ?mutation, "updating route");
        mutation.apply(&mut route);
        let entry = Arc::new(RouteEntry::build(key.clone(), route)?);
        *slot = Arc::clone(&entry);
        Ok(Some(entry))
    }

    /// Remove every route of an owner. Returns how many were removed.
    pub async fn clear_owner(&self, owner_id: OwnerId) -> usize {
        let removed = self.write().remove(&owner_id).unwrap_or_default();
        if removed.is_empty() {
            return 0;
        }
        {
            let mut stats = self.stats_lock();
            for name in removed.keys() {
                stats.remove(&RouteKey::new(owner_id, name.clone()));
            }
        }
        info!(owner_id, removed = removed.len(), "cleared routes");
        self.persist().await;
        removed.len()
    }

    /// Counters of one route.
    #[must_use]
    pub fn stats(&self, key: &RouteKey) -> Option<RouteStats> {
        self.stats_lock().get(key).cloned()
    }

    /// Update the counters of a route. A route removed in the meantime is
    /// ignored.
    pub fn record(&self, key: &RouteKey, update: impl FnOnce(&mut RouteStats)) {
        if let Some(stats) = self.stats_lock().get_mut(key) {
            update(stats);
        }
    }

    /// Copy of the table in its stored layout.
    #[must_use]
    pub fn snapshot(&self) -> RouteMap {
        self.read()
            .iter()
            .map(|(owner, routes)| {
                let routes = routes
                    .iter()
                    .map(|(name, entry)| (name.clone(), entry.route.clone()))
                    .collect();
                (*owner, routes)
            })
            .collect()
    }

    /// Write the current table to the store.
    pub async fn save(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await
    }

    /// Like [`save`](Self::save), but failures are only logged. The in-memory
    /// table stays authoritative and the next save catches up.
    pub async fn persist(&self) {
        if let Err(e) = self.save().await {
            error!(error = %e, "failed to save routes");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::store_memory::MemoryRouteStore};

    async fn table_with(routes: &[(OwnerId, &str, Route)]) -> (RouteTable, Arc<MemoryRouteStore>) {
        let mut map = RouteMap::new();
        for (owner, name, route) in routes {
            map.entry(*owner)
                .or_default()
                .insert((*name).to_string(), route.clone());
        }
        let store = Arc::new(MemoryRouteStore::with_routes(map));
        let table = RouteTable::load(store.clone()).await.unwrap();
        (table, store)
    }

    #[test]
    fn route_json_layout() {
        let json = serde_json::to_value(Route::new(-100, -200)).unwrap();
        assert_eq!(json["source"], -100);
        assert_eq!(json["destination"], -200);
        assert_eq!(json["active"], true);
        assert_eq!(json["blacklist"], serde_json::json!([]));
        assert_eq!(json["remove_mentions"], false);
    }

    #[test]
    fn route_missing_active_defaults_on() {
        let route: Route = serde_json::from_str(r#"{"source": 1, "destination": "2"}"#).unwrap();
        assert!(route.active);
        assert_eq!(route.destination, 2);
    }

    #[test]
    fn route_rejects_non_numeric_chat() {
        assert!(serde_json::from_str::<Route>(r#"{"source": "abc", "destination": 2}"#).is_err());
    }

    #[tokio::test]
    async fn match_source_picks_first_active_in_key_order() {
        let paused = Route {
            active: false,
            ..Route::new(10, 1)
        };
        let (table, _) = table_with(&[
            (1, "a", paused),
            (1, "b", Route::new(10, 2)),
            (2, "a", Route::new(10, 3)),
        ])
        .await;
        let entry = table.match_source(10).unwrap();
        assert_eq!(entry.key, RouteKey::new(1, "b"));
        assert!(table.match_source(99).is_none());
    }

    #[tokio::test]
    async fn mutate_recompiles_and_persists() {
        let (table, store) = table_with(&[(1, "news", Route::new(10, 20))]).await;
        let key = RouteKey::new(1, "news");
        let entry = table
            .mutate(&key, RouteMutation::AddBlacklistWords(vec!["spam".into()]))
            .await
            .unwrap();
        assert!(entry.route.filters.blacklist_words.contains("spam"));
        assert!(!entry.rules.apply("buy spam", &[], false).is_blocked());
        let saved = store.routes();
        assert!(saved[&1]["news"].filters.blacklist_words.contains("spam"));
    }

    #[tokio::test]
    async fn mutate_unknown_route_fails() {
        let (table, _) = table_with(&[]).await;
        let err = table
            .mutate(&RouteKey::new(1, "nope"), RouteMutation::ClearBlacklist)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn held_entries_are_not_affected_by_mutation() {
        let (table, _) = table_with(&[(1, "news", Route::new(10, 20))]).await;
        let key = RouteKey::new(1, "news");
        let before = table.get(&key).unwrap();
        table.mutate(&key, RouteMutation::SetActive(false)).await.unwrap();
        assert!(before.route.active);
        assert!(!table.is_active(&key));
    }

    #[tokio::test]
    async fn disable_only_reports_transition() {
        let (table, _) = table_with(&[(1, "news", Route::new(10, 20))]).await;
        let key = RouteKey::new(1, "news");
        assert!(table.disable(&key).await);
        assert!(!table.disable(&key).await);
        assert!(!table.disable(&RouteKey::new(1, "gone")).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_disables_report_one_transition() {
        let (table, _) = table_with(&[(1, "news", Route::new(10, 20))]).await;
        let table = Arc::new(table);
        let key = RouteKey::new(1, "news");
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let table = Arc::clone(&table);
                let key = key.clone();
                tokio::spawn(async move { table.disable(&key).await })
            })
            .collect();
        let mut transitions = 0;
        for task in tasks {
            if task.await.unwrap() {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);
        assert!(!table.is_active(&key));
    }

    #[tokio::test]
    async fn upsert_resets_stats() {
        let (table, _) = table_with(&[(1, "news", Route::new(10, 20))]).await;
        let key = RouteKey::new(1, "news");
        table.record(&key, |s| s.forwarded += 5);
        assert_eq!(table.stats(&key).unwrap().forwarded, 5);

        table.upsert(key.clone(), Route::new(11, 21)).await.unwrap();
        assert_eq!(table.stats(&key).unwrap(), RouteStats::default());
        assert_eq!(table.get(&key).unwrap().route.source, 11);
    }

    #[tokio::test]
    async fn clear_owner_removes_routes_and_stats() {
        let (table, store) = table_with(&[
            (1, "a", Route::new(10, 20)),
            (1, "b", Route::new(11, 21)),
            (2, "a", Route::new(12, 22)),
        ])
        .await;
        assert_eq!(table.clear_owner(1).await, 2);
        assert!(table.routes_of(1).is_empty());
        assert!(table.stats(&RouteKey::new(1, "a")).is_none());
        assert_eq!(table.len(), 1);
        assert!(!store.routes().contains_key(&1));
        assert_eq!(table.clear_owner(1).await, 0);
    }

    #[tokio::test]
    async fn record_ignores_removed_routes() {
        let (table, _) = table_with(&[]).await;
        let key = RouteKey::new(1, "gone");
        table.record(&key, |s| s.forwarded += 1);
        assert!(table.stats(&key).is_none());
    }

    #[tokio::test]
    async fn image_fingerprints_are_lowercased() {
        let (table, _) = table_with(&[(1, "news", Route::new(10, 20))]).await;
        let key = RouteKey::new(1, "news");
        let entry = table
            .mutate(&key, RouteMutation::AddBlockedImage("ABCDEF0123456789".into()))
            .await
            .unwrap();
        assert!(entry.rules.is_blocked_fingerprint("abcdef0123456789"));
        assert!(entry.rules.checks_images());
    }
}
