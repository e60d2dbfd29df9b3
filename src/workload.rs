//! Concurrent point-read workload.
//!
//! Each reader gets its own connection and thread and issues random lookups
//! by id. All readers start together behind a barrier; per-query latency is
//! recorded for the report.

use crate::dataset::map_row;
use crate::loader::SnapshotReaders;
use crate::report::WorkloadResult;
use anyhow::{anyhow, ensure, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Where readers send their queries.
#[derive(Debug, Clone, Copy)]
pub enum ReadTarget<'a> {
    /// The durable file; every reader opens it read-only.
    Disk(&'a Path),
    /// A loaded snapshot; every reader opens a query-only shared-cache
    /// connection onto it.
    Snapshot(&'a SnapshotReaders),
}

impl ReadTarget<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            ReadTarget::Disk(_) => "disk",
            ReadTarget::Snapshot(_) => "memory",
        }
    }

    pub fn open_reader(&self) -> Result<Connection> {
        match self {
            ReadTarget::Disk(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("open disk reader on {}", path.display())),
            ReadTarget::Snapshot(readers) => Ok(readers.open()?),
        }
    }
}

/// Shape of one workload run.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadParams {
    pub readers: usize,
    pub queries_per_reader: usize,
    /// Ids are drawn uniformly from `1..=max_id`.
    pub max_id: i64,
    pub seed: u64,
}

/// Run `params.readers` concurrent readers against `target`.
pub fn run_point_reads(
    target: ReadTarget<'_>,
    table: &str,
    params: &WorkloadParams,
) -> Result<WorkloadResult> {
    ensure!(params.readers > 0, "at least one reader is required");
    ensure!(params.max_id > 0, "max_id must be positive");

    // Open everything up front so connection setup is not measured.
    let readers = (0..params.readers)
        .map(|_| target.open_reader())
        .collect::<Result<Vec<_>>>()?;

    let sql = format!("SELECT id, name, age, rating FROM \"{table}\" WHERE id = ?1");
    let barrier = Barrier::new(params.readers + 1);

    log::debug!(
        "Starting {} {} readers x {} queries",
        params.readers,
        target.label(),
        params.queries_per_reader
    );

    let (outcomes, elapsed) = thread::scope(|s| {
        let handles: Vec<_> = readers
            .into_iter()
            .enumerate()
            .map(|(i, conn)| {
                let sql = sql.as_str();
                let barrier = &barrier;
                let seed = params.seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                s.spawn(move || {
                    barrier.wait();
                    reader_loop(conn, sql, params.queries_per_reader, params.max_id, seed)
                })
            })
            .collect();

        barrier.wait();
        let started = Instant::now();
        let outcomes: Vec<_> = handles
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                h.join()
                    .map_err(|_| anyhow!("reader {i} panicked"))
                    .and_then(|r| r.with_context(|| format!("reader {i} failed")))
            })
            .collect();
        (outcomes, started.elapsed())
    });

    let mut result = WorkloadResult::new(target.label(), params.readers);
    for outcome in outcomes {
        let (latencies, misses) = outcome?;
        result.add_reader(latencies, misses);
    }
    result.set_elapsed(elapsed);
    Ok(result)
}

/// One reader's lookups. Returns per-query latencies and how many ids were
/// not found.
fn reader_loop(
    conn: Connection,
    sql: &str,
    queries: usize,
    max_id: i64,
    seed: u64,
) -> Result<(Vec<Duration>, usize)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stmt = conn.prepare(sql)?;
    let mut latencies = Vec::with_capacity(queries);
    let mut misses = 0;

    for _ in 0..queries {
        let id = rng.gen_range(1..=max_id);
        let start = Instant::now();
        let row = stmt.query_row(params![id], map_row).optional()?;
        latencies.push(start.elapsed());
        if row.is_none() {
            misses += 1;
        }
    }
    Ok((latencies, misses))
}
