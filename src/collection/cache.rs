//! DbCache — a persisted mirror of a slower backend tree.
//!
//! The cache sits on top of some other, slower hierarchy (a filesystem
//! walker, a remote index) and stores its shape and metadata in a local
//! snapshot, which makes metadata search realistic where scanning the
//! backend would be dreadful. The cache only accelerates indexing:
//! query results are resolved back through the backend by path, so stale
//! binary content is never served from the snapshot.

use crate::collection::store::{self, Store};
use crate::collection::{Collection, MediaTree};
use crate::config::CacheConfig;
use crate::error::{MediaBusError, Result, ResultExt};
use crate::media::MediaRef;
use crate::query::{compile, Constraint};
use crate::sync::lock;
use chrono::{DateTime, Utc};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// How old the last successful update may be before `refresh` acts.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(3600);

/// A collection backed by a snapshot store and a slower backend tree.
pub struct DbCache<T: MediaTree + 'static> {
    store: Arc<Store>,
    backend: Arc<Mutex<T>>,
    staleness: Duration,
    stamp: Mutex<Option<DateTime<Utc>>>,
    refresher: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl<T: MediaTree + 'static> DbCache<T> {
    /// Opens the cache at `path`, mirroring `backend`, with the default
    /// staleness threshold.
    pub fn open(path: impl AsRef<Path>, backend: T) -> Result<Self> {
        Self::with_staleness(path, backend, DEFAULT_STALENESS)
    }

    pub fn with_staleness(
        path: impl AsRef<Path>,
        backend: T,
        staleness: Duration,
    ) -> Result<Self> {
        let store = Arc::new(Store::open(path).context("opening cache store")?);
        let stamp = {
            let conn = store.conn();
            store::meta_get(&conn, "last_update")?
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        Ok(Self {
            store,
            backend: Arc::new(Mutex::new(backend)),
            staleness,
            stamp: Mutex::new(stamp),
            refresher: Mutex::new(None),
        })
    }

    pub fn from_config(path: impl AsRef<Path>, backend: T, config: &CacheConfig) -> Result<Self> {
        Self::with_staleness(path, backend, Duration::from_secs(config.staleness_secs))
    }

    /// When the last successful update finished, as persisted in the
    /// store.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *lock(&self.stamp)
    }

    /// Triggers an update when the snapshot has gone stale; a no-op
    /// otherwise.
    pub fn refresh(&self) -> Result<()> {
        let threshold = chrono::Duration::seconds(self.staleness.as_secs() as i64);
        let stale = match *lock(&self.stamp) {
            None => true,
            Some(t) => Utc::now().signed_duration_since(t) > threshold,
        };
        if stale {
            self.update()?;
            *lock(&self.stamp) = Some(Utc::now());
        }
        Ok(())
    }

    /// Updates the snapshot from the backend in the background.
    ///
    /// The first call spawns the refresh walk and returns immediately; a
    /// subsequent call joins the walk and surfaces its result.
    pub fn update(&self) -> Result<()> {
        let mut slot = lock(&self.refresher);
        match slot.take() {
            None => {
                let store = Arc::clone(&self.store);
                let backend = Arc::clone(&self.backend);
                let handle = std::thread::Builder::new()
                    .name("cache-refresh".into())
                    .spawn(move || run_update(&store, &backend))?;
                *slot = Some(handle);
                Ok(())
            }
            Some(handle) => handle
                .join()
                .map_err(|_| MediaBusError::Handler("cache refresh thread panicked".into()))?,
        }
    }

    /// Compiles `constraint`, runs one filtered scan over the snapshot,
    /// and resolves the matches back into the backend. Rows come back in
    /// randomized order, truncated to `limit` when positive.
    pub fn find_media(&self, constraint: &Constraint, limit: usize) -> Result<Vec<MediaRef>> {
        let filter = compile(constraint, &mut rand::rng());
        tracing::debug!(clause = %filter.clause, params = filter.params.len(), "querying cache");

        // The refresh walk holds the backend lock while it writes to the
        // store, so the store lock must be released here before the
        // backend lock is taken.
        let paths = {
            let conn = self.store.conn();
            let mut sql = format!(
                "SELECT entries.name, entries.path_id FROM entries \
                 WHERE {} ORDER BY RANDOM()",
                filter.clause
            );
            let mut params: Vec<Value> = filter.params;
            if limit > 0 {
                sql.push_str(" LIMIT ?");
                params.push(Value::Integer(limit as i64));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?;

            let mut paths = Vec::new();
            for row in rows {
                let (name, path_id) = row?;
                let dir = store::full_path(&conn, path_id)?;
                paths.push(if dir.is_empty() {
                    name
                } else {
                    format!("{dir}/{name}")
                });
            }
            paths
        };

        let backend = lock(&self.backend);
        let mut found = Vec::new();
        for path in paths {
            match backend.root().resolve(&path) {
                Some(leaf) => found.push(leaf.media()),
                None => {
                    tracing::debug!(path = %path, "cached entry no longer resolves, skipping")
                }
            }
        }
        Ok(found)
    }
}

impl<T: MediaTree + 'static> Collection for DbCache<T> {
    fn refresh(&self) -> Result<()> {
        DbCache::refresh(self)
    }

    fn find_media(&self, constraint: &Constraint, limit: usize) -> Result<Vec<MediaRef>> {
        DbCache::find_media(self, constraint, limit)
    }
}

/// The refresh walk: run the backend's own refresh, then mirror every
/// leaf into the snapshot. Leaf insertion is idempotent via the path
/// content address; metadata pairs replace prior values per key.
fn run_update<T: MediaTree>(store: &Store, backend: &Mutex<T>) -> Result<()> {
    let mut tree = lock(backend);
    tree.update().context("refreshing backend tree")?;

    let conn = store.conn();
    tree.root().for_each_leaf(&mut |path, leaf| {
        let hash = store::path_hash(path);
        let entry = match store::find_entry_by_hash(&conn, &hash)? {
            Some(existing) => existing,
            None => {
                let components: Vec<&str> =
                    path.split('/').filter(|c| !c.is_empty()).collect();
                let Some((name, dirs)) = components.split_last() else {
                    return Ok(());
                };
                store::insert_entry(&conn, dirs, name, &hash)
                    .with_context(|| format!("mirroring {path}"))?
            }
        };
        for (key, value) in leaf.media().metadata() {
            store::upsert_metadata(&conn, entry.id, &key, &value)
                .with_context(|| format!("writing metadata for {path}"))?;
        }
        Ok(())
    })?;

    store::meta_set(&conn, "last_update", &Utc::now().to_rfc3339())?;
    tracing::info!("cache refresh complete");
    Ok(())
}
