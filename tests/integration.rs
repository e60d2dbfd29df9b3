//! Integration tests: load sequence, cleanup on failure, and concurrent reads.

use rusqlite::Connection;
use sqlite_snapshot::dataset::{
    self, count_rows, create_source_database, generate_rows, read_all, read_by_id, SourceRow,
};
use sqlite_snapshot::loader::{
    attach_source, attached_schemas, copy_table, open_store, table_exists,
};
use sqlite_snapshot::pragmas::{JournalMode, PragmaReport};
use sqlite_snapshot::workload::{run_point_reads, ReadTarget, WorkloadParams};
use sqlite_snapshot::{load_snapshot, LoadError, MemoryPragmas, MemoryStoreId, SnapshotConfig};
use std::path::PathBuf;
use tempfile::TempDir;

fn source_with(rows: &[SourceRow]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("source.db");
    create_source_database(&path, rows).expect("create source");
    (dir, path)
}

fn three_rows() -> Vec<SourceRow> {
    vec![
        SourceRow {
            id: 1,
            name: "alice".into(),
            age: 31,
            rating: 4.5,
        },
        SourceRow {
            id: 2,
            name: "bob".into(),
            age: 42,
            rating: 3.25,
        },
        SourceRow {
            id: 3,
            name: "carol".into(),
            age: 27,
            rating: 9.0,
        },
    ]
}

// ── Successful load ─────────────────────────────────────────────────

#[test]
fn three_row_scenario() {
    let rows = three_rows();
    let (_dir, path) = source_with(&rows);
    let snapshot = load_snapshot(
        &path,
        &MemoryStoreId::unique("three"),
        &SnapshotConfig::default(),
    )
    .unwrap();

    assert_eq!(snapshot.row_count(), 3);
    for row in &rows {
        let found = read_by_id(snapshot.connection(), snapshot.table(), row.id).unwrap();
        assert_eq!(found.as_ref(), Some(row));
    }
    assert_eq!(read_all(snapshot.connection(), snapshot.table()).unwrap(), rows);

    snapshot.close().unwrap();
}

#[test]
fn snapshot_matches_source_row_for_row() {
    let rows = generate_rows(2_000, dataset::SEED);
    let (_dir, path) = source_with(&rows);
    let snapshot = load_snapshot(
        &path,
        &MemoryStoreId::unique("match"),
        &SnapshotConfig::default(),
    )
    .unwrap();

    let mut copied = read_all(snapshot.connection(), snapshot.table()).unwrap();
    copied.sort_by_key(|r| r.id);
    assert_eq!(copied, rows);
    assert_eq!(snapshot.row_count(), rows.len() as u64);

    // The source is attached read-only and must be untouched.
    let source = Connection::open(&path).unwrap();
    assert_eq!(read_all(&source, dataset::TABLE).unwrap(), rows);
}

#[test]
fn alias_is_gone_after_load() {
    let (_dir, path) = source_with(&three_rows());
    let config = SnapshotConfig::default();
    let snapshot = load_snapshot(&path, &MemoryStoreId::unique("alias"), &config).unwrap();

    let schemas = attached_schemas(snapshot.connection()).unwrap();
    assert!(!schemas.iter().any(|s| s == &config.alias), "{schemas:?}");

    let err = snapshot
        .connection()
        .query_row(
            &format!("SELECT count(*) FROM \"{}\".users", config.alias),
            [],
            |r| r.get::<_, i64>(0),
        )
        .unwrap_err();
    assert!(err.to_string().contains("no such table"), "{err}");
}

#[test]
fn all_pragmas_are_in_effect() {
    let (_dir, path) = source_with(&three_rows());
    let config = SnapshotConfig::default();
    let snapshot = load_snapshot(&path, &MemoryStoreId::unique("pragmas"), &config).unwrap();

    let report = snapshot.pragma_report().unwrap();
    assert_eq!(report.journal_mode, "off");
    assert_eq!(report.synchronous, 0);
    assert_eq!(report.cache_size, config.pragmas.cache_size);
    assert_eq!(report.locking_mode, "exclusive");
    assert_eq!(report.temp_store, 2);
    assert!(config.pragmas.is_satisfied_by(&report));
}

#[test]
fn custom_cache_size_is_applied() {
    let (_dir, path) = source_with(&three_rows());
    let config = SnapshotConfig {
        pragmas: MemoryPragmas {
            cache_size: 4_000,
            ..MemoryPragmas::default()
        },
        ..SnapshotConfig::default()
    };
    let snapshot = load_snapshot(&path, &MemoryStoreId::unique("cache"), &config).unwrap();
    let report = PragmaReport::read(snapshot.connection()).unwrap();
    assert_eq!(report.cache_size, 4_000);
}

#[test]
fn key_index_is_built_on_copy() {
    let (_dir, path) = source_with(&three_rows());
    let snapshot = load_snapshot(
        &path,
        &MemoryStoreId::unique("index"),
        &SnapshotConfig::default(),
    )
    .unwrap();

    let indexes: i64 = snapshot
        .connection()
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'users'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 1);
}

#[test]
fn target_table_can_be_renamed() {
    let (_dir, path) = source_with(&three_rows());
    let config = SnapshotConfig {
        target_table: "users_mem".into(),
        index_column: None,
        ..SnapshotConfig::default()
    };
    let snapshot = load_snapshot(&path, &MemoryStoreId::unique("rename"), &config).unwrap();
    assert_eq!(snapshot.table(), "users_mem");
    assert_eq!(count_rows(snapshot.connection(), "users_mem").unwrap(), 3);
}

#[test]
fn empty_source_loads_empty_snapshot() {
    let (_dir, path) = source_with(&[]);
    let snapshot = load_snapshot(
        &path,
        &MemoryStoreId::unique("empty"),
        &SnapshotConfig::default(),
    )
    .unwrap();
    assert_eq!(snapshot.row_count(), 0);
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn missing_source_fails_at_step_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.db");
    let store = MemoryStoreId::unique("missing");

    let err = load_snapshot(&path, &store, &SnapshotConfig::default()).unwrap_err();
    assert!(matches!(err, LoadError::SourceOpen { .. }), "{err:?}");
    assert_eq!(err.step(), Some(1));
    assert!(!path.exists(), "read-only open must not create the file");

    // Nothing was left behind under the store id.
    let check = store.open().unwrap();
    assert!(!table_exists(&check, "main", "users").unwrap());
}

#[test]
fn non_database_source_fails_at_step_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![0x5a_u8; 8192]).unwrap();

    let err = load_snapshot(
        &path,
        &MemoryStoreId::unique("garbage"),
        &SnapshotConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.step(), Some(1), "{err:?}");
}

#[test]
fn missing_source_table_fails_at_step_one() {
    let (_dir, path) = source_with(&three_rows());
    let config = SnapshotConfig {
        source_table: "nope".into(),
        ..SnapshotConfig::default()
    };

    let err = load_snapshot(&path, &MemoryStoreId::unique("notable"), &config).unwrap_err();
    assert!(matches!(err, LoadError::SourceTableMissing { .. }), "{err:?}");
    assert_eq!(err.step(), Some(1));
}

#[test]
fn zero_byte_source_fails_at_step_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db");
    std::fs::write(&path, b"").unwrap();

    let err = load_snapshot(
        &path,
        &MemoryStoreId::unique("zero"),
        &SnapshotConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::SourceTableMissing { .. }), "{err:?}");
    assert_eq!(err.step(), Some(1));
}

#[cfg(unix)]
#[test]
fn non_utf8_source_path_fails_at_step_one() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(OsStr::from_bytes(b"src-\xff.db"));
    create_source_database(&path, &three_rows()).unwrap();

    let err = load_snapshot(
        &path,
        &MemoryStoreId::unique("non-utf8"),
        &SnapshotConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::SourceOpen { .. }), "{err:?}");
    assert_eq!(err.step(), Some(1));
}

#[cfg(unix)]
#[test]
fn double_slash_source_path_loads() {
    let (_dir, path) = source_with(&three_rows());
    let doubled = PathBuf::from(format!("/{}", path.display()));

    let snapshot = load_snapshot(
        &doubled,
        &MemoryStoreId::unique("slashes"),
        &SnapshotConfig::default(),
    )
    .unwrap();
    assert_eq!(snapshot.row_count(), 3);
}

#[test]
fn attach_failure_leaves_store_usable() {
    let (_dir, path) = source_with(&three_rows());
    let store = MemoryStoreId::unique("attach");
    let config = SnapshotConfig::default();

    let conn = open_store(&store, &config.target_table).unwrap();
    let first = attach_source(&conn, &path, &config.alias).unwrap();

    let err = attach_source(&conn, &path, &config.alias).unwrap_err();
    assert!(matches!(err, LoadError::Attach { .. }), "{err:?}");
    assert_eq!(err.step(), Some(3));

    first.detach().unwrap();
    assert!(!table_exists(&conn, "main", &config.target_table).unwrap());
    assert!(conn.close().is_ok());

    let snapshot = load_snapshot(&path, &store, &config).unwrap();
    assert_eq!(snapshot.row_count(), 3);
}

#[test]
fn index_failure_fails_copy_and_releases_store() {
    let (_dir, path) = source_with(&three_rows());
    let store = MemoryStoreId::unique("badindex");
    let config = SnapshotConfig {
        index_column: Some("no_such_column".into()),
        ..SnapshotConfig::default()
    };

    let err = load_snapshot(&path, &store, &config).unwrap_err();
    assert!(matches!(err, LoadError::Copy { .. }), "{err:?}");
    assert_eq!(err.step(), Some(4));

    // The copy rolled back with the index and the store was closed, so the
    // same id loads cleanly.
    let snapshot = load_snapshot(&path, &store, &SnapshotConfig::default()).unwrap();
    assert_eq!(snapshot.row_count(), 3);
}

#[test]
fn rejected_pragma_fails_at_step_six_and_releases_store() {
    let (_dir, path) = source_with(&three_rows());
    let store = MemoryStoreId::unique("wal");
    let config = SnapshotConfig {
        pragmas: MemoryPragmas {
            journal_mode: JournalMode::Wal,
            ..MemoryPragmas::default()
        },
        ..SnapshotConfig::default()
    };

    let err = load_snapshot(&path, &store, &config).unwrap_err();
    assert!(matches!(err, LoadError::PragmaRejected { .. }), "{err:?}");
    assert_eq!(err.step(), Some(6));

    let snapshot = load_snapshot(&path, &store, &SnapshotConfig::default()).unwrap();
    assert_eq!(snapshot.row_count(), 3);
    assert_eq!(snapshot.pragma_report().unwrap().journal_mode, "off");
}

#[test]
fn schema_conflict_leaves_store_closable_and_empty() {
    let (_dir, path) = source_with(&three_rows());
    let store = MemoryStoreId::unique("conflict");
    let config = SnapshotConfig::default();

    let conn = open_store(&store, &config.target_table).unwrap();
    conn.execute_batch("CREATE TABLE users (x INTEGER)").unwrap();

    let guard = attach_source(&conn, &path, &config.alias).unwrap();
    let err = copy_table(&conn, &config).unwrap_err();
    assert!(matches!(err, LoadError::Copy { .. }), "{err:?}");
    drop(guard);

    let rows: i64 = conn
        .query_row("SELECT count(*) FROM users", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    assert!(!attached_schemas(&conn)
        .unwrap()
        .iter()
        .any(|s| s == &config.alias));
    assert!(conn.close().is_ok());
}

#[test]
fn occupied_store_is_rejected() {
    let (_dir, path) = source_with(&three_rows());
    let store = MemoryStoreId::unique("occupied");
    let first = load_snapshot(&path, &store, &SnapshotConfig::default()).unwrap();

    let err = load_snapshot(&path, &store, &SnapshotConfig::default()).unwrap_err();
    assert!(matches!(err, LoadError::StoreOccupied { .. }), "{err:?}");

    // The live snapshot is unaffected.
    assert_eq!(count_rows(first.connection(), first.table()).unwrap(), 3);
}

#[test]
fn invalid_identifier_is_rejected_before_opening() {
    let (_dir, path) = source_with(&three_rows());
    let config = SnapshotConfig {
        source_table: "users; DROP TABLE users".into(),
        ..SnapshotConfig::default()
    };
    let err = load_snapshot(&path, &MemoryStoreId::unique("ident"), &config).unwrap_err();
    assert!(matches!(err, LoadError::InvalidIdentifier(_)), "{err:?}");
}

// ── Readers ─────────────────────────────────────────────────────────

#[test]
fn readers_see_snapshot_and_cannot_write() {
    let (_dir, path) = source_with(&three_rows());
    let snapshot = load_snapshot(
        &path,
        &MemoryStoreId::unique("reader"),
        &SnapshotConfig::default(),
    )
    .unwrap();

    let reader = snapshot.open_reader().unwrap();
    assert_eq!(count_rows(&reader, "users").unwrap(), 3);
    assert!(reader
        .execute("INSERT INTO users (id, name, age, rating) VALUES (9, 'x', 1, 1.0)", [])
        .is_err());
    assert_eq!(count_rows(snapshot.connection(), "users").unwrap(), 3);
}

#[test]
fn concurrent_snapshot_readers_find_every_id() {
    let rows = generate_rows(500, dataset::SEED);
    let (_dir, path) = source_with(&rows);
    let snapshot = load_snapshot(
        &path,
        &MemoryStoreId::unique("concurrent"),
        &SnapshotConfig::default(),
    )
    .unwrap();

    let params = WorkloadParams {
        readers: 4,
        queries_per_reader: 250,
        max_id: rows.len() as i64,
        seed: 7,
    };
    let readers = snapshot.readers();
    let result = run_point_reads(ReadTarget::Snapshot(&readers), "users", &params).unwrap();
    assert_eq!(result.target, "memory");
    assert_eq!(result.readers, 4);
    assert_eq!(result.queries(), 1_000);
    assert_eq!(result.misses, 0);
    assert!(result.elapsed > std::time::Duration::ZERO);
}

#[test]
fn readers_open_from_other_threads() {
    let rows = generate_rows(200, dataset::SEED);
    let (_dir, path) = source_with(&rows);
    let snapshot = load_snapshot(
        &path,
        &MemoryStoreId::unique("threads"),
        &SnapshotConfig::default(),
    )
    .unwrap();
    let readers = snapshot.readers();

    let counts: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let readers = readers.clone();
                s.spawn(move || {
                    let conn = readers.open().unwrap();
                    assert!(conn.execute("DELETE FROM users", []).is_err());
                    count_rows(&conn, "users").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(counts, vec![200; 4]);

    // The workload can also be driven from a thread other than the owner's.
    let params = WorkloadParams {
        readers: 2,
        queries_per_reader: 100,
        max_id: rows.len() as i64,
        seed: 3,
    };
    let result = std::thread::scope(|s| {
        s.spawn(|| run_point_reads(ReadTarget::Snapshot(&readers), "users", &params))
            .join()
            .unwrap()
    })
    .unwrap();
    assert_eq!(result.misses, 0);
}

#[test]
fn disk_readers_miss_ids_past_the_end() {
    let rows = generate_rows(50, dataset::SEED);
    let (_dir, path) = source_with(&rows);

    let params = WorkloadParams {
        readers: 2,
        queries_per_reader: 200,
        max_id: 100,
        seed: 11,
    };
    let result = run_point_reads(ReadTarget::Disk(&path), "users", &params).unwrap();
    assert_eq!(result.target, "disk");
    assert_eq!(result.queries(), 400);
    assert!(result.misses > 0 && result.misses < 400);
}

#[test]
fn zero_readers_is_an_error() {
    let (_dir, path) = source_with(&three_rows());
    let params = WorkloadParams {
        readers: 0,
        queries_per_reader: 10,
        max_id: 3,
        seed: 0,
    };
    assert!(run_point_reads(ReadTarget::Disk(&path), "users", &params).is_err());
}
