//! Memory-snapshot loader.
//!
//! Copies one relation from a durable SQLite file into a named in-memory
//! store in seven ordered steps:
//!
//! | Step | Action                                              |
//! |------|-----------------------------------------------------|
//! | 1    | open the source read-only and check its schema      |
//! | 2    | open the in-memory store                            |
//! | 3    | ATTACH the source under an alias                    |
//! | 4    | CREATE TABLE ... AS SELECT (+ optional key index)   |
//! | 5    | DETACH the alias and confirm it is gone             |
//! | 6    | apply [`MemoryPragmas`]                             |
//! | 7    | close the source connection                         |
//!
//! Any failure aborts the sequence; connections opened by earlier steps are
//! closed before the error is returned.

use crate::error::{LoadError, Result};
use crate::pragmas::{MemoryPragmas, PragmaReport};
use crate::store::{read_only_uri, MemoryStoreId};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::time::Instant;

/// What to copy and how to tune the copy.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Relation read from the durable dataset.
    pub source_table: String,
    /// Relation created in the in-memory store.
    pub target_table: String,
    /// Schema name the source is attached under while copying.
    pub alias: String,
    /// `CREATE TABLE ... AS SELECT` drops the primary key, so lookups by id
    /// need an index rebuilt on the copy.
    pub index_column: Option<String>,
    pub pragmas: MemoryPragmas,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            source_table: crate::dataset::TABLE.to_string(),
            target_table: crate::dataset::TABLE.to_string(),
            alias: "source".to_string(),
            index_column: Some("id".to_string()),
            pragmas: MemoryPragmas::default(),
        }
    }
}

impl SnapshotConfig {
    /// Every name ends up inside SQL text, so only plain identifiers pass.
    pub fn validate(&self) -> Result<()> {
        check_identifier(&self.source_table)?;
        check_identifier(&self.target_table)?;
        check_identifier(&self.alias)?;
        if self.alias.eq_ignore_ascii_case("main") || self.alias.eq_ignore_ascii_case("temp") {
            return Err(LoadError::InvalidIdentifier(self.alias.clone()));
        }
        if let Some(column) = &self.index_column {
            check_identifier(column)?;
        }
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(LoadError::InvalidIdentifier(name.to_string()))
    }
}

/// A loaded snapshot. Owns the connection that keeps the store alive.
#[derive(Debug)]
pub struct Snapshot {
    conn: Connection,
    store: MemoryStoreId,
    table: String,
    rows: u64,
}

impl Snapshot {
    /// Holding connection. Treat as read-only.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn store(&self) -> &MemoryStoreId {
        &self.store
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows copied at load time.
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    /// Open another connection onto the same store for a concurrent reader.
    pub fn open_reader(&self) -> Result<Connection> {
        self.readers().open()
    }

    /// Handle other threads use to open their own readers.
    pub fn readers(&self) -> SnapshotReaders {
        SnapshotReaders {
            store: self.store.clone(),
        }
    }

    pub fn pragma_report(&self) -> Result<PragmaReport> {
        Ok(PragmaReport::read(&self.conn)?)
    }

    /// Release the store. Readers still open keep it alive until they close.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, source)| LoadError::Close {
            what: "in-memory store",
            source,
        })?;
        log::info!("Closed snapshot store {}", self.store);
        Ok(())
    }
}

/// Opens query-only connections onto a loaded snapshot. Holds no connection
/// itself, so it can be cloned into any number of reader threads.
///
/// Opens succeed only while the [`Snapshot`] (or another reader) keeps the
/// store alive.
#[derive(Debug, Clone)]
pub struct SnapshotReaders {
    store: MemoryStoreId,
}

impl SnapshotReaders {
    pub fn store(&self) -> &MemoryStoreId {
        &self.store
    }

    /// The connection is `query_only`, so it cannot write to the snapshot.
    pub fn open(&self) -> Result<Connection> {
        let reader = self.store.open().map_err(|source| LoadError::StoreOpen {
            store: self.store.name().to_string(),
            source,
        })?;
        reader.pragma_update(None, "query_only", true)?;
        Ok(reader)
    }
}

/// Run the full load sequence.
pub fn load_snapshot(
    source: &Path,
    store: &MemoryStoreId,
    config: &SnapshotConfig,
) -> Result<Snapshot> {
    config.validate()?;
    let started = Instant::now();
    log::info!(
        "Loading {}.{} into memory store {}",
        source.display(),
        config.source_table,
        store
    );

    let source_conn = open_source(source, &config.source_table)?;

    let store_conn = match open_store(store, &config.target_table) {
        Ok(conn) => conn,
        Err(err) => {
            release(source_conn, "source connection");
            return Err(err);
        }
    };

    let rows = match populate(&store_conn, source, config) {
        Ok(rows) => rows,
        Err(err) => {
            log::error!("Snapshot load into {} failed: {}", store, err);
            release(store_conn, "in-memory store");
            release(source_conn, "source connection");
            return Err(err);
        }
    };

    source_conn.close().map_err(|(_, source)| LoadError::Close {
        what: "source connection",
        source,
    })?;

    log::info!(
        "Snapshot {} ready: {} rows in {:.2}ms",
        store,
        rows,
        started.elapsed().as_secs_f64() * 1000.0
    );

    Ok(Snapshot {
        conn: store_conn,
        store: store.clone(),
        table: config.target_table.clone(),
        rows,
    })
}

/// Steps 3-6 against an open store.
fn populate(store: &Connection, source: &Path, config: &SnapshotConfig) -> Result<u64> {
    let guard = attach_source(store, source, &config.alias)?;
    let rows = copy_table(store, config)?;
    guard.detach()?;
    config.pragmas.apply(store)?;
    Ok(rows)
}

/// Step 1. A missing file fails the open; a file that is not a database
/// fails the schema read; a database without `table` (including an empty
/// file) fails the table check. Non-UTF-8 paths are refused because the
/// attach in step 3 goes through a URI.
pub fn open_source(path: &Path, table: &str) -> Result<Connection> {
    let source_err = |source| LoadError::SourceOpen {
        path: path.to_path_buf(),
        source,
    };
    if path.to_str().is_none() {
        return Err(source_err(rusqlite::Error::InvalidPath(path.to_path_buf())));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(source_err)?;
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| {
        r.get::<_, i64>(0)
    })
    .map_err(source_err)?;
    if !table_exists(&conn, "main", table).map_err(source_err)? {
        release(conn, "source connection");
        return Err(LoadError::SourceTableMissing {
            path: path.to_path_buf(),
            table: table.to_string(),
        });
    }
    log::debug!("Opened source {} read-only", path.display());
    Ok(conn)
}

/// Step 2. Fails with [`LoadError::StoreOccupied`] when the store already
/// holds `table`, i.e. an earlier snapshot under the same id is still alive.
pub fn open_store(store: &MemoryStoreId, table: &str) -> Result<Connection> {
    let conn = store.open().map_err(|source| LoadError::StoreOpen {
        store: store.name().to_string(),
        source,
    })?;
    let occupied = table_exists(&conn, "main", table).map_err(|source| LoadError::StoreOpen {
        store: store.name().to_string(),
        source,
    })?;
    if occupied {
        release(conn, "in-memory store");
        return Err(LoadError::StoreOccupied {
            store: store.name().to_string(),
            table: table.to_string(),
        });
    }
    log::debug!("Opened memory store {}", store.uri());
    Ok(conn)
}

/// An attached schema. Detaches on drop if [`AttachGuard::detach`] was not
/// reached.
#[derive(Debug)]
pub struct AttachGuard<'c> {
    conn: &'c Connection,
    alias: String,
    attached: bool,
}

impl AttachGuard<'_> {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Step 5. Detach and confirm the alias no longer resolves.
    pub fn detach(mut self) -> Result<()> {
        self.conn
            .execute_batch(&format!("DETACH DATABASE \"{}\"", self.alias))
            .map_err(|source| LoadError::Detach {
                alias: self.alias.clone(),
                source,
            })?;
        self.attached = false;

        let still_listed = attached_schemas(self.conn)
            .map_err(|source| LoadError::Detach {
                alias: self.alias.clone(),
                source,
            })?
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&self.alias));
        if still_listed {
            return Err(LoadError::StillAttached(self.alias.clone()));
        }
        log::debug!("Detached {}", self.alias);
        Ok(())
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if !self.attached {
            return;
        }
        if let Err(e) = self
            .conn
            .execute_batch(&format!("DETACH DATABASE \"{}\"", self.alias))
        {
            log::warn!("Failed to detach {} during cleanup: {}", self.alias, e);
        }
    }
}

/// Step 3. The source is attached through a `mode=ro` URI, so the copy can
/// never write back to it.
pub fn attach_source<'c>(
    store: &'c Connection,
    source: &Path,
    alias: &str,
) -> Result<AttachGuard<'c>> {
    check_identifier(alias)?;
    let uri = read_only_uri(source).ok_or_else(|| LoadError::Attach {
        alias: alias.to_string(),
        source: rusqlite::Error::InvalidPath(source.to_path_buf()),
    })?;
    store
        .execute(&format!("ATTACH DATABASE ?1 AS \"{alias}\""), params![uri])
        .map_err(|source| LoadError::Attach {
            alias: alias.to_string(),
            source,
        })?;
    log::debug!("Attached {} as {}", uri, alias);
    Ok(AttachGuard {
        conn: store,
        alias: alias.to_string(),
        attached: true,
    })
}

/// Step 4. One `CREATE TABLE ... AS SELECT` from the attached source, plus
/// the key index when configured, in a single transaction. Returns the
/// number of rows copied.
pub fn copy_table(store: &Connection, config: &SnapshotConfig) -> Result<u64> {
    config.validate()?;
    let copy_err = |source| LoadError::Copy {
        table: config.target_table.clone(),
        source,
    };

    let tx = store.unchecked_transaction().map_err(copy_err)?;
    tx.execute_batch(&format!(
        "CREATE TABLE main.\"{target}\" AS SELECT * FROM \"{alias}\".\"{source}\"",
        target = config.target_table,
        alias = config.alias,
        source = config.source_table,
    ))
    .map_err(copy_err)?;

    if let Some(column) = &config.index_column {
        tx.execute_batch(&format!(
            "CREATE UNIQUE INDEX main.\"{target}_{column}_idx\" ON \"{target}\" (\"{column}\")",
            target = config.target_table,
        ))
        .map_err(copy_err)?;
    }

    let rows: i64 = tx
        .query_row(
            &format!("SELECT count(*) FROM main.\"{}\"", config.target_table),
            [],
            |r| r.get(0),
        )
        .map_err(copy_err)?;
    tx.commit().map_err(copy_err)?;

    log::debug!("Copied {} rows into {}", rows, config.target_table);
    Ok(rows as u64)
}

/// Schema names currently visible on `conn` (`main`, `temp`, attachments).
pub fn attached_schemas(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

pub fn table_exists(conn: &Connection, schema: &str, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT count(*) FROM \"{schema}\".sqlite_master WHERE type = 'table' AND name = ?1"),
        params![table],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

fn release(conn: Connection, what: &str) {
    if let Err((_, e)) = conn.close() {
        log::warn!("Failed to close {}: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_checked() {
        assert!(check_identifier("users").is_ok());
        assert!(check_identifier("_t1").is_ok());
        assert!(check_identifier("").is_err());
        assert!(check_identifier("1abc").is_err());
        assert!(check_identifier("a\"; DROP TABLE x; --").is_err());
    }

    #[test]
    fn reserved_alias_is_rejected() {
        let config = SnapshotConfig {
            alias: "main".into(),
            ..SnapshotConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LoadError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn fresh_store_lists_only_builtin_schemas() {
        let conn = MemoryStoreId::unique("schemas").open().unwrap();
        let names = attached_schemas(&conn).unwrap();
        assert!(names.iter().any(|n| n == "main"));
        assert!(names.iter().all(|n| n == "main" || n == "temp"));
    }
}
