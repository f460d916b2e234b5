//! Integration tests for tree-loader
//!
//! These tests walk real temporary trees and load them into SQLite
//! databases or flat files.

use regex::bytes::Regex;
use rusqlite::Connection;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use tempfile::{tempdir, TempDir};
use tree_loader::config::WalkConfig;
use tree_loader::coordinator::LoadCoordinator;
use tree_loader::error::{LoadError, WalkerError};
use tree_loader::load::schema::{self, keys};
use tree_loader::fs::EntryResolver;
use tree_loader::load::SqliteLoader;
use tree_loader::walker::TreeWalker;

/// Root with f1.txt, a link to it, a subdirectory and a dangling link
fn scenario_tree() -> TempDir {
    let temp = tempdir().unwrap();
    let a = temp.path().join("a");
    fs::create_dir_all(a.join("sub")).unwrap();
    fs::write(a.join("f1.txt"), b"0123456789").unwrap();
    symlink(a.join("f1.txt"), a.join("f2.txt")).unwrap();
    symlink(a.join("missing"), a.join("dangling")).unwrap();
    temp
}

fn config(root: &Path, output: &Path, pattern: &str) -> WalkConfig {
    let mut config = WalkConfig::new(root, output);
    config.pattern = Regex::new(pattern).unwrap();
    config.worker_count = 4;
    config
}

fn rows(db: &Path, table: &str) -> Vec<(String, Option<i64>, Option<String>, Option<String>)> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT \"Path\", \"Size\", \"Target\", \"Error\" FROM \"{}\" ORDER BY \"Path\"",
            table
        ))
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_matched_files_and_links() {
    let tree = scenario_tree();
    let out = tempdir().unwrap();
    let db = out.path().join("files.db");

    let summary = LoadCoordinator::new(&config(tree.path(), &db, r"\.txt$"))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(summary.load.rows_loaded, 2);

    let rows = rows(&db, "files");
    assert_eq!(rows.len(), 2);

    let (f1, f2) = (&rows[0], &rows[1]);
    assert!(f1.0.ends_with("/a/f1.txt"));
    assert_eq!(f1.1, Some(10));
    assert_eq!(f1.2, None);

    assert!(f2.0.ends_with("/a/f2.txt"));
    assert_eq!(f2.1, Some(10));
    assert!(f2.2.as_deref().unwrap().ends_with("/a/f1.txt"));
    assert_eq!(f2.3, None);
}

#[test]
fn test_dangling_link_becomes_error_row() {
    let tree = scenario_tree();
    let out = tempdir().unwrap();
    let db = out.path().join("files.db");

    LoadCoordinator::new(&config(tree.path(), &db, ".*"))
        .unwrap()
        .run()
        .unwrap();

    let rows = rows(&db, "files");
    assert_eq!(rows.len(), 3);

    let dangling = rows.iter().find(|r| r.0.ends_with("/a/dangling")).unwrap();
    assert!(dangling.3.is_some());
    assert!(dangling.2.as_deref().unwrap().ends_with("missing"));
    assert!(!rows.iter().any(|r| r.0.ends_with("/a/sub")));
}

#[test]
fn test_owner_and_mode_columns() {
    let tree = scenario_tree();
    let out = tempdir().unwrap();
    let db = out.path().join("files.db");

    LoadCoordinator::new(&config(tree.path(), &db, r"f1\.txt$"))
        .unwrap()
        .run()
        .unwrap();

    let conn = Connection::open(&db).unwrap();
    let (mode, modified): (String, String) = conn
        .query_row("SELECT \"Mode\", \"Modified\" FROM files", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert!(mode.starts_with('-'));
    assert_eq!(mode.len(), 10);
    assert!(chrono::NaiveDateTime::parse_from_str(&modified, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
}

#[test]
fn test_missing_root_writes_nothing() {
    let out = tempdir().unwrap();
    let db = out.path().join("files.db");

    let result = LoadCoordinator::new(&config(&out.path().join("nope"), &db, ""));
    assert!(matches!(result, Err(WalkerError::Walk(_))));
    assert!(!db.exists());
}

#[test]
fn test_every_file_is_loaded() {
    let tree = tempdir().unwrap();
    for d in 0..10 {
        let dir = tree.path().join(format!("d{}", d));
        fs::create_dir(&dir).unwrap();
        for f in 0..100 {
            fs::write(dir.join(format!("f{}", f)), b"").unwrap();
        }
    }
    let out = tempdir().unwrap();
    let db = out.path().join("files.db");

    let summary = LoadCoordinator::new(&config(tree.path(), &db, ""))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(summary.load.rows_loaded, 1000);
    assert_eq!(summary.counts.records, 1000);
    assert_eq!(rows(&db, "files").len(), 1000);

    let conn = Connection::open(&db).unwrap();
    assert_eq!(
        schema::get_load_info(&conn, "files", keys::ROWS_LOADED).unwrap(),
        Some("1000".to_string())
    );
}

#[test]
fn test_rerun_replaces_table() {
    let tree = tempdir().unwrap();
    for i in 0..5 {
        fs::write(tree.path().join(format!("f{}", i)), b"x").unwrap();
    }
    let out = tempdir().unwrap();
    let db = out.path().join("files.db");

    LoadCoordinator::new(&config(tree.path(), &db, "")).unwrap().run().unwrap();
    assert_eq!(rows(&db, "files").len(), 5);

    for i in 0..3 {
        fs::remove_file(tree.path().join(format!("f{}", i))).unwrap();
    }
    LoadCoordinator::new(&config(tree.path(), &db, "")).unwrap().run().unwrap();
    assert_eq!(rows(&db, "files").len(), 2);
}

#[test]
fn test_failed_load_keeps_previous_table() {
    let tree = tempdir().unwrap();
    fs::write(tree.path().join("one"), b"x").unwrap();
    let out = tempdir().unwrap();
    let db = out.path().join("files.db");

    LoadCoordinator::new(&config(tree.path(), &db, "")).unwrap().run().unwrap();
    fs::write(tree.path().join("two"), b"x").unwrap();

    let walker = TreeWalker::new(tree.path(), Regex::new("").unwrap(), EntryResolver::system()).unwrap();
    let loader = SqliteLoader::open(&db, "files", 0).unwrap();

    // Another writer holds the database for the whole run
    let locker = Connection::open(&db).unwrap();
    locker.execute_batch("BEGIN IMMEDIATE").unwrap();
    let result = LoadCoordinator::from_parts(walker, Box::new(loader)).run();
    assert!(matches!(result, Err(WalkerError::Load(LoadError::Sqlite(_)))));

    locker.execute_batch("ROLLBACK").unwrap();
    let rows = rows(&db, "files");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].0.ends_with("/one"));
}

#[test]
fn test_tsv_destination() {
    let tree = scenario_tree();
    let out = tempdir().unwrap();
    let file = out.path().join("files.tsv");
    fs::write(&file, "previous contents\n").unwrap();

    LoadCoordinator::new(&config(tree.path(), &file, r"\.txt$"))
        .unwrap()
        .run()
        .unwrap();

    let text = fs::read_to_string(&file).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.split('\t').count() == 8));
    assert!(!text.contains("previous"));
}

#[test]
fn test_bad_table_name_is_rejected() {
    let out = tempdir().unwrap();
    let result = SqliteLoader::open(&out.path().join("x.db"), "x; DROP", 0);
    assert!(matches!(result, Err(LoadError::OpenFailed { .. })));
}
