//! The persisted cache snapshot store.
//!
//! One SQLite database per cache, holding a mirrored path tree and the
//! metadata of every cached leaf:
//!
//! - `paths(id, parent_id, name)` — tree segments, unique per
//!   `(parent_id, name)`; the root row has an empty name.
//! - `entries(id, path_id, name, path_hash)` — one row per cached leaf;
//!   `path_hash` is the content address of the full logical path and the
//!   deduplication key.
//! - `metadata(entry_id, name, value)` — one row per (entry, key) pair.
//! - `_meta(key, value)` — schema version and last-refresh timestamp.
//!
//! All access is serialized through the store's connection mutex; the
//! helpers below take the already-open connection, so nothing ever needs
//! to re-enter the lock.

use crate::error::{MediaBusError, Result, ResultExt};
use crate::media::MetaValue;
use crate::sync::lock;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Current schema version, stored under `_meta['_version']`.
pub const SCHEMA_VERSION: &str = "1";

const SCHEMA_V1: &str = "
CREATE TABLE paths (id INTEGER PRIMARY KEY, parent_id INTEGER, name TEXT);
CREATE UNIQUE INDEX parent_name ON paths (parent_id, name);
CREATE TABLE entries (id INTEGER PRIMARY KEY, path_id INTEGER, name TEXT, path_hash TEXT);
CREATE UNIQUE INDEX entry_hash ON entries (path_hash);
CREATE TABLE metadata (entry_id INTEGER, name TEXT, value);
CREATE UNIQUE INDEX entry_key ON metadata (entry_id, name);
";

/// A cached leaf row.
pub(crate) struct EntryRow {
    pub id: i64,
    pub path_id: i64,
    pub name: String,
}

/// Handle to one snapshot database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the store at `path` and migrates it to the
    /// current schema version. Schema failures here are fatal: the cache
    /// cannot run without its snapshot.
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        register_regexp(&conn)?;
        migrate(&conn).context("initializing cache snapshot schema")?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Acquires the store's connection. A thread holds this for a whole
    /// cache operation; a different thread blocks until release.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// The stored schema version string.
    pub fn schema_version(&self) -> Result<Option<String>> {
        meta_get(&self.conn(), "_version")
    }
}

/// Content address of a full logical path — the leaf dedup key.
pub fn path_hash(logical_path: &str) -> String {
    hex::encode(Sha256::digest(logical_path.as_bytes()))
}

/// Registers the `regexp(pattern, value)` function backing the REGEXP
/// operator used by regex constraints. Non-text values are stringified
/// before matching.
fn register_regexp(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern = ctx.get::<String>(0)?;
            let re = Regex::new(&pattern)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            let matched = match ctx.get_raw(1) {
                ValueRef::Text(t) => std::str::from_utf8(t)
                    .map(|s| re.is_match(s))
                    .unwrap_or(false),
                ValueRef::Integer(i) => re.is_match(&i.to_string()),
                ValueRef::Real(f) => re.is_match(&f.to_string()),
                _ => false,
            };
            Ok(matched)
        },
    )?;
    Ok(())
}

/// Brings the database up to the current schema version. Migrations are
/// forward-only and keyed by the stored version string.
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute("CREATE TABLE IF NOT EXISTS _meta (key TEXT UNIQUE, value TEXT)", [])?;
    let version = meta_get(conn, "_version")?;
    match version.as_deref() {
        None => {
            tracing::info!("creating cache schema version {SCHEMA_VERSION}");
            conn.execute_batch(SCHEMA_V1)?;
            meta_set(conn, "_version", SCHEMA_VERSION)?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(MediaBusError::Config(format!(
                "cache schema version {other} is newer than this build supports"
            )));
        }
    }
    Ok(())
}

/// Reads a piece of store metadata.
pub(crate) fn meta_get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM _meta WHERE key = ?1", params![key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Saves a piece of store metadata, replacing any prior value.
pub(crate) fn meta_set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO _meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// Resolves the path id for a chain of directory segments, creating
/// missing segments as it walks. Each segment is looked up by
/// `(parent_id, name)` before insertion, so repeated updates never
/// duplicate a segment. The walk starts at the synthetic root segment
/// (empty name, parent 0).
pub(crate) fn path_id(conn: &Connection, dirs: &[&str]) -> Result<i64> {
    let mut parent = 0i64;
    for segment in std::iter::once("").chain(dirs.iter().copied()) {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM paths WHERE parent_id = ?1 AND name = ?2",
                params![parent, segment],
                |r| r.get(0),
            )
            .optional()?;
        parent = match existing {
            Some(id) => id,
            None => {
                conn.execute(
                    "INSERT INTO paths (parent_id, name) VALUES (?1, ?2)",
                    params![parent, segment],
                )?;
                conn.last_insert_rowid()
            }
        };
    }
    Ok(parent)
}

/// Rebuilds the `/`-joined logical path for a path id, relative to the
/// root (no leading slash; empty for the root itself).
pub(crate) fn full_path(conn: &Connection, path_id: i64) -> Result<String> {
    let mut segments = Vec::new();
    let mut current = path_id;
    loop {
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT parent_id, name FROM paths WHERE id = ?1",
                params![current],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((parent, name)) if !name.is_empty() => {
                segments.push(name);
                current = parent;
            }
            _ => break,
        }
    }
    segments.reverse();
    Ok(segments.join("/"))
}

/// Looks up a cached leaf by its path content address.
pub(crate) fn find_entry_by_hash(conn: &Connection, hash: &str) -> Result<Option<EntryRow>> {
    let row = conn
        .query_row(
            "SELECT id, path_id, name FROM entries WHERE path_hash = ?1",
            params![hash],
            |r| {
                Ok(EntryRow {
                    id: r.get(0)?,
                    path_id: r.get(1)?,
                    name: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Inserts a new leaf entry under the given directory chain.
pub(crate) fn insert_entry(
    conn: &Connection,
    dirs: &[&str],
    name: &str,
    hash: &str,
) -> Result<EntryRow> {
    let path_id = path_id(conn, dirs)?;
    conn.execute(
        "INSERT INTO entries (path_id, name, path_hash) VALUES (?1, ?2, ?3)",
        params![path_id, name, hash],
    )?;
    Ok(EntryRow {
        id: conn.last_insert_rowid(),
        path_id,
        name: name.to_string(),
    })
}

/// Writes one metadata pair for an entry, replacing any prior value for
/// the same key.
pub(crate) fn upsert_metadata(
    conn: &Connection,
    entry_id: i64,
    key: &str,
    value: &MetaValue,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (entry_id, name, value) VALUES (?1, ?2, ?3)",
        params![entry_id, key, Value::from(value)],
    )?;
    Ok(())
}

impl From<&MetaValue> for Value {
    fn from(v: &MetaValue) -> Value {
        match v {
            MetaValue::Text(s) => Value::Text(s.clone()),
            MetaValue::Int(i) => Value::Integer(*i),
            MetaValue::Float(f) => Value::Real(*f),
        }
    }
}
