//! Source dataset: the durable `users` relation the snapshot is copied from.
//!
//! Rows are generated from a fixed seed so repeated runs read identical data.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Relation name used for both the source and the snapshot by default.
pub const TABLE: &str = "users";

/// Default generator seed.
pub const SEED: u64 = 0xDEAD_BEEF_CAFE_1337;

const NAMES: [&str; 8] = [
    "ada", "brendan", "dennis", "grace", "guido", "ken", "linus", "margaret",
];

/// One row of the source relation.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub rating: f64,
}

/// Generate `count` rows with ids `1..=count`.
pub fn generate_rows(count: usize, seed: u64) -> Vec<SourceRow> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count as i64)
        .map(|id| {
            let base = NAMES[rng.gen_range(0..NAMES.len())];
            SourceRow {
                id,
                name: format!("{base}_{id:06}"),
                age: rng.gen_range(18..90),
                rating: rng.gen_range(0..10_000) as f64 / 100.0,
            }
        })
        .collect()
}

/// (Re)create the source database at `path` holding exactly `rows`.
///
/// Ids are left to SQLite; rows are inserted in order so the assigned ids
/// match `SourceRow::id` when the input is numbered from 1.
pub fn create_source_database(path: &Path, rows: &[SourceRow]) -> Result<()> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("create source database {}", path.display()))?;

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {TABLE};
         CREATE TABLE {TABLE} (
             id     INTEGER PRIMARY KEY AUTOINCREMENT,
             name   TEXT    NOT NULL,
             age    INTEGER NOT NULL,
             rating REAL    NOT NULL
         );"
    ))
    .context("create source schema")?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {TABLE} (name, age, rating) VALUES (?1, ?2, ?3)"
        ))?;
        for row in rows {
            stmt.execute(params![row.name, row.age, row.rating])?;
        }
    }
    tx.commit().context("commit source rows")?;

    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Every row of `table`, ordered by id.
pub fn read_all(conn: &Connection, table: &str) -> Result<Vec<SourceRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, age, rating FROM \"{table}\" ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([], map_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn read_by_id(conn: &Connection, table: &str, id: i64) -> Result<Option<SourceRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT id, name, age, rating FROM \"{table}\" WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], map_row).optional()?)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    let n: i64 = conn.query_row(&format!("SELECT count(*) FROM \"{table}\""), [], |r| {
        r.get(0)
    })?;
    Ok(n as u64)
}

pub(crate) fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRow> {
    Ok(SourceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        rating: row.get(3)?,
    })
}
