//! Integration tests for the collection cache and the query compiler's
//! end-to-end behavior against a real snapshot store.

mod common;

use common::{wait_for_tag, wait_until};
use mediabus::bus::{roster, NodeHandle, Packet, PacketKind, PacketTag};
use mediabus::collection::{DbCache, LibraryNode, MediaTree, MemoryTree, TreeNode};
use mediabus::media::{Metadata, MemoryMedia, MetaValue};
use mediabus::query::Constraint;
use mediabus::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn meta(pairs: &[(&str, MetaValue)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn text(v: &str) -> MetaValue {
    MetaValue::Text(v.into())
}

/// A small music library:
///
/// ```text
/// /artists/pixies/debaser.flac     artist=Pixies,   year=1989, genre=alt
/// /artists/pixies/velouria.flac    artist=Pixies,   year=1990
/// /artists/slowdive/alison.flac    artist=Slowdive, year=1993, genre=shoegaze
/// /singles/track2000.mp3           artist=Nobody,   year=2000
/// /loose.mp3                       (no metadata)
/// ```
fn library_tree() -> MemoryTree {
    let mut root = TreeNode::root();

    let mut artists = TreeNode::new("artists");
    let mut pixies = TreeNode::new("pixies");
    pixies.add_leaf(
        "debaser.flac",
        MemoryMedia::new(
            "debaser",
            meta(&[
                ("artist", text("Pixies")),
                ("year", MetaValue::Int(1989)),
                ("genre", text("alt")),
            ]),
            vec![],
        ),
    );
    pixies.add_leaf(
        "velouria.flac",
        MemoryMedia::new(
            "velouria",
            meta(&[("artist", text("Pixies")), ("year", MetaValue::Int(1990))]),
            vec![],
        ),
    );
    artists.add_node(pixies);

    let mut slowdive = TreeNode::new("slowdive");
    slowdive.add_leaf(
        "alison.flac",
        MemoryMedia::new(
            "alison",
            meta(&[
                ("artist", text("Slowdive")),
                ("year", MetaValue::Int(1993)),
                ("genre", text("shoegaze")),
            ]),
            vec![],
        ),
    );
    artists.add_node(slowdive);
    root.add_node(artists);

    let mut singles = TreeNode::new("singles");
    singles.add_leaf(
        "track2000.mp3",
        MemoryMedia::new(
            "track2000",
            meta(&[("artist", text("Nobody")), ("year", MetaValue::Int(2000))]),
            vec![],
        ),
    );
    root.add_node(singles);

    root.add_leaf("loose.mp3", MemoryMedia::new("loose", Metadata::new(), vec![]));

    MemoryTree::new(root)
}

fn open_cache(dir: &tempfile::TempDir) -> DbCache<MemoryTree> {
    DbCache::open(dir.path().join("cache.db"), library_tree()).expect("open cache")
}

/// Runs the two-phase background update to completion.
fn update_now<T: MediaTree + 'static>(cache: &DbCache<T>) {
    common::init_logging();
    cache.update().expect("spawn refresh");
    cache.update().expect("join refresh");
}

fn names(constraint: &Constraint, cache: &DbCache<MemoryTree>, limit: usize) -> Vec<String> {
    let mut found: Vec<String> = cache
        .find_media(constraint, limit)
        .expect("query")
        .iter()
        .map(|m| m.describe())
        .collect();
    found.sort();
    found
}

fn query_int(db: &Path, sql: &str) -> i64 {
    let conn = Connection::open(db).expect("open db");
    conn.query_row(sql, [], |r| r.get(0)).expect("query")
}

#[test]
fn update_mirrors_every_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    assert_eq!(
        names(&Constraint::Any, &cache, 0),
        vec!["alison", "debaser", "loose", "track2000", "velouria"]
    );
}

#[test]
fn repeated_updates_never_duplicate_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);
    update_now(&cache);
    update_now(&cache);

    let db = dir.path().join("cache.db");
    assert_eq!(query_int(&db, "SELECT COUNT(*) FROM entries"), 5);
    // Intermediate path segments are looked up before insertion too:
    // root, artists, pixies, slowdive, singles.
    assert_eq!(query_int(&db, "SELECT COUNT(*) FROM paths"), 5);
}

struct ScriptedTree {
    root: TreeNode,
    year: Arc<Mutex<i64>>,
}

impl MediaTree for ScriptedTree {
    fn update(&mut self) -> Result<()> {
        let mut root = TreeNode::root();
        root.add_leaf(
            "song.mp3",
            MemoryMedia::new(
                "song",
                meta(&[("year", MetaValue::Int(*self.year.lock().unwrap()))]),
                vec![],
            ),
        );
        self.root = root;
        Ok(())
    }

    fn root(&self) -> &TreeNode {
        &self.root
    }
}

#[test]
fn changed_metadata_replaces_the_prior_value() {
    let dir = tempfile::tempdir().unwrap();
    let year = Arc::new(Mutex::new(1989i64));
    let cache = DbCache::open(
        dir.path().join("cache.db"),
        ScriptedTree {
            root: TreeNode::root(),
            year: Arc::clone(&year),
        },
    )
    .expect("open cache");

    update_now(&cache);
    *year.lock().unwrap() = 1990;
    update_now(&cache);

    let db = dir.path().join("cache.db");
    assert_eq!(
        query_int(&db, "SELECT COUNT(*) FROM metadata WHERE name = 'year'"),
        1
    );
    assert_eq!(
        query_int(&db, "SELECT value FROM metadata WHERE name = 'year'"),
        1990
    );
}

#[test]
fn conjunction_composes_across_keys() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    let both = Constraint::And(vec![
        Constraint::has("artist"),
        Constraint::equals("year", 2000i64),
    ]);
    assert_eq!(names(&both, &cache, 0), vec!["track2000"]);

    // Rejected when either side is missing.
    let wrong_year = Constraint::And(vec![
        Constraint::has("genre"),
        Constraint::equals("year", 2000i64),
    ]);
    assert!(names(&wrong_year, &cache, 0).is_empty());
}

#[test]
fn degenerate_constraints() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    assert!(names(&Constraint::Any.negate(), &cache, 0).is_empty());
    assert!(names(&Constraint::Or(vec![]), &cache, 0).is_empty());
    assert_eq!(names(&Constraint::And(vec![]), &cache, 0).len(), 5);
    assert!(names(&Constraint::Nothing, &cache, 0).is_empty());
}

#[test]
fn random_match_gates_the_whole_result_set() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    let mut outcomes = std::collections::HashSet::new();
    for _ in 0..40 {
        let n = cache
            .find_media(&Constraint::RandomMatch(50), 0)
            .expect("query")
            .len();
        // One draw per query: every row passes or none do.
        assert!(n == 0 || n == 5, "got a per-row mix: {n} of 5");
        outcomes.insert(n);
    }
    assert_eq!(outcomes.len(), 2, "gate never flipped across 40 draws");
}

#[test]
fn contains_matches_values_not_keys() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    // The probe string is compared against stored values...
    assert_eq!(
        names(&Constraint::Contains("shoegaze".into()), &cache, 0),
        vec!["alison"]
    );
    // ...and never against key names, surprising as that looks.
    assert!(names(&Constraint::Contains("genre".into()), &cache, 0).is_empty());
}

#[test]
fn comparisons_run_constraint_value_against_stored_value() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    // GreaterThan(key, v) keeps rows whose stored value is below v.
    assert_eq!(
        names(
            &Constraint::GreaterThan("year".into(), MetaValue::Int(1990)),
            &cache,
            0
        ),
        vec!["debaser"]
    );
    // LessThan(key, v) keeps rows whose stored value is above v.
    assert_eq!(
        names(
            &Constraint::LessThan("year".into(), MetaValue::Int(1990)),
            &cache,
            0
        ),
        vec!["alison", "track2000"]
    );
}

#[test]
fn pattern_constraints() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    assert_eq!(
        names(&Constraint::Regex("artist".into(), "^Pix".into()), &cache, 0),
        vec!["debaser", "velouria"]
    );
    assert_eq!(
        names(&Constraint::Glob("artist".into(), "Slow*".into()), &cache, 0),
        vec!["alison"]
    );
}

#[test]
fn limit_truncates_results() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(&dir);
    update_now(&cache);

    assert_eq!(cache.find_media(&Constraint::Any, 2).expect("query").len(), 2);
}

#[test]
fn snapshot_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = open_cache(&dir);
        update_now(&cache);
    }

    let db = dir.path().join("cache.db");
    let conn = Connection::open(&db).expect("open db");
    let version: String = conn
        .query_row("SELECT value FROM _meta WHERE key = '_version'", [], |r| {
            r.get(0)
        })
        .expect("version");
    assert_eq!(version, "1");

    // A reopened cache sees the persisted refresh stamp and serves
    // queries without touching the backend's refresh.
    let cache = open_cache(&dir);
    assert!(cache.last_update().is_some());
    assert_eq!(names(&Constraint::Any, &cache, 0).len(), 5);
}

#[test]
fn refresh_is_a_noop_while_fresh() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = open_cache(&dir);
        update_now(&cache);
    }
    // A fresh handle picks the refresh stamp up from the store.
    let cache = open_cache(&dir);

    let db = dir.path().join("cache.db");
    let stamp_before = || -> String {
        let conn = Connection::open(&db).expect("open db");
        conn.query_row(
            "SELECT value FROM _meta WHERE key = 'last_update'",
            [],
            |r| r.get(0),
        )
        .expect("stamp")
    };

    let before = stamp_before();
    cache.refresh().expect("refresh");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(stamp_before(), before);
}

#[test]
fn library_node_answers_query_packets() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DbCache::with_staleness(
        dir.path().join("cache.db"),
        library_tree(),
        Duration::ZERO,
    )
    .expect("open cache");
    update_now(&cache);

    let library = NodeHandle::new(LibraryNode::new().with_collection(Box::new(cache)));
    let (out, seen) = common::collector();
    library.connect(&out, None);

    library.accept(Packet::new(PacketKind::Query {
        constraint: Constraint::has("artist"),
        limit: 0,
    }));

    assert!(wait_for_tag(&seen, PacketTag::QueryResult, 1));
    let result_len = seen
        .lock()
        .unwrap()
        .iter()
        .find_map(|p| match p.kind() {
            PacketKind::QueryResult(media) => Some(media.len()),
            _ => None,
        })
        .expect("result packet");
    assert_eq!(result_len, 4);

    roster::kill_all();
    assert!(wait_until(2000, || roster::all_nodes().is_empty()));
}
