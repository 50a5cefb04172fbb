//! Session snapshot persistence across reloads.
//!
//! Two string-keyed slots back the discovery screen: an ephemeral store that
//! a hard reload wipes, and a durable store used only for profile hints. The
//! last-search record and the recommendation cache are serialized as single
//! blobs and overwritten wholesale, never patched field by field.
//!
//! Restoration is one-way and fetch-free: a snapshot is read once at mount,
//! validated (schema version, owning user, recommendation freshness), and
//! anything that fails validation is treated as a cache miss, never as an
//! error the user sees.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use odx_core::{
    CompanyProfile, FilterConfig, Opportunity, RecommendationCacheEntry, SearchSession, SortKey,
    RECOMMENDATION_TTL_SECS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

pub const CRATE_NAME: &str = "odx-session";

/// Bumped whenever the snapshot layout changes; older blobs are cache misses.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

const LAST_SEARCH_KEY: &str = "odx.last_search";
const RECOMMENDATION_CACHE_KEY: &str = "odx.recommendations";
const PROFILE_HINT_KEY: &str = "odx.profile_hint";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Opaque string store. Writes are last-write-wins; the stores are scoped to
/// one tab/session, so no cross-writer discipline is needed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), PersistError>;
    async fn remove(&self, key: &str) -> Result<(), PersistError>;
    async fn clear(&self) -> Result<(), PersistError>;
}

/// Tab-scoped ephemeral store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// Durable store: one JSON file per key under a root directory, written via
/// temp file + atomic rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), PersistError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let dest = self.path_for(key);
        let temp = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(value.as_bytes()).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&temp, &dest).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self) -> Result<(), PersistError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

/// Versioned, owner-tagged export of a session's externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub user_id: String,
    pub query: String,
    pub refined_query: Option<String>,
    pub filter: FilterConfig,
    pub sort: SortKey,
    pub master_list: Vec<Opportunity>,
    pub working_list: Vec<Opportunity>,
    pub page: usize,
    pub page_size: usize,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn capture(user_id: &str, session: &SearchSession) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION,
            user_id: user_id.to_string(),
            query: session.query.clone(),
            refined_query: session.refined_query.clone(),
            filter: session.filter.clone(),
            sort: session.sort,
            master_list: session.master_list.clone(),
            working_list: session.working_list.clone(),
            page: session.page,
            page_size: session.page_size,
            saved_at: Utc::now(),
        }
    }

    pub fn into_session(self) -> SearchSession {
        SearchSession {
            query: self.query,
            refined_query: self.refined_query,
            master_list: self.master_list,
            working_list: self.working_list,
            page: self.page,
            page_size: self.page_size,
            filter: self.filter,
            sort: self.sort,
        }
    }
}

/// How the screen was entered; a hard reload always starts from a clean
/// slate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    HardReload,
    ClientNavigation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoredState {
    pub session: SearchSession,
    pub recommendations: Option<RecommendationCacheEntry>,
}

pub struct SessionPersistence<E, D> {
    ephemeral: E,
    durable: D,
    user_id: String,
    recommendation_ttl: Duration,
}

impl<E: KeyValueStore, D: KeyValueStore> SessionPersistence<E, D> {
    pub fn new(ephemeral: E, durable: D, user_id: impl Into<String>) -> Self {
        Self {
            ephemeral,
            durable,
            user_id: user_id.into(),
            recommendation_ttl: Duration::seconds(RECOMMENDATION_TTL_SECS),
        }
    }

    pub fn with_recommendation_ttl(mut self, ttl: Duration) -> Self {
        self.recommendation_ttl = ttl;
        self
    }

    /// Write the last-search record, overwritten wholesale under one key.
    /// Called on every successful search and filter/sort change.
    pub async fn save_session(&self, session: &SearchSession) -> Result<(), PersistError> {
        let snapshot = SessionSnapshot::capture(&self.user_id, session);
        let blob = serde_json::to_string(&snapshot)?;
        self.ephemeral.put(LAST_SEARCH_KEY, &blob).await
    }

    /// Write the recommendation cache entry after a successful fetch.
    pub async fn save_recommendations(
        &self,
        entry: &RecommendationCacheEntry,
    ) -> Result<(), PersistError> {
        let blob = serde_json::to_string(entry)?;
        self.ephemeral.put(RECOMMENDATION_CACHE_KEY, &blob).await
    }

    /// Read back the persisted state, applying the restoration rules in
    /// order: hard reload purges everything; a parse failure, schema-version
    /// mismatch, or foreign user id is a silent cache miss; a recommendation
    /// entry survives only when its query matches the restored query and it
    /// is younger than the staleness window.
    pub async fn restore(&self, load: LoadKind) -> Result<Option<RestoredState>, PersistError> {
        if load == LoadKind::HardReload {
            self.purge().await?;
            return Ok(None);
        }

        let Some(blob) = self.ephemeral.get(LAST_SEARCH_KEY).await? else {
            return Ok(None);
        };
        let snapshot: SessionSnapshot = match serde_json::from_str(&blob) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "dropping unparseable session snapshot");
                self.ephemeral.remove(LAST_SEARCH_KEY).await?;
                return Ok(None);
            }
        };
        if snapshot.version != SNAPSHOT_SCHEMA_VERSION {
            warn!(found = snapshot.version, "dropping snapshot with foreign schema version");
            self.ephemeral.remove(LAST_SEARCH_KEY).await?;
            return Ok(None);
        }
        if snapshot.user_id != self.user_id {
            // Shared-browser guard: never restore another account's results.
            warn!("dropping session snapshot owned by a different user");
            self.ephemeral.remove(LAST_SEARCH_KEY).await?;
            return Ok(None);
        }

        let recommendations = self.restore_recommendations(&snapshot.query).await?;
        Ok(Some(RestoredState {
            session: snapshot.into_session(),
            recommendations,
        }))
    }

    async fn restore_recommendations(
        &self,
        query: &str,
    ) -> Result<Option<RecommendationCacheEntry>, PersistError> {
        let Some(blob) = self.ephemeral.get(RECOMMENDATION_CACHE_KEY).await? else {
            return Ok(None);
        };
        let entry: RecommendationCacheEntry = match serde_json::from_str(&blob) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "dropping unparseable recommendation cache entry");
                self.ephemeral.remove(RECOMMENDATION_CACHE_KEY).await?;
                return Ok(None);
            }
        };
        if !entry.is_fresh(query, Utc::now(), self.recommendation_ttl) {
            self.ephemeral.remove(RECOMMENDATION_CACHE_KEY).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Profile hints live in the durable store and outlive the session.
    pub async fn save_profile_hint(&self, profile: &CompanyProfile) -> Result<(), PersistError> {
        let blob = serde_json::to_string(profile)?;
        self.durable.put(PROFILE_HINT_KEY, &blob).await
    }

    pub async fn load_profile_hint(&self) -> Result<Option<CompanyProfile>, PersistError> {
        let Some(blob) = self.durable.get(PROFILE_HINT_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&blob) {
            Ok(profile) => Ok(Some(profile)),
            Err(err) => {
                warn!(%err, "dropping unparseable profile hint");
                self.durable.remove(PROFILE_HINT_KEY).await?;
                Ok(None)
            }
        }
    }

    pub async fn purge(&self) -> Result<(), PersistError> {
        self.ephemeral.clear().await?;
        self.durable.clear().await?;
        Ok(())
    }
}
