//! Standalone runner: builds a source database, loads it into a memory
//! snapshot and prints a disk-vs-memory read latency report.
//!
//! Configuration comes from the environment (see `config`); a `.env` file in
//! the working directory is loaded first if present.
//!
//! Usage:
//!   cargo run --release
//!   SNAPSHOT_ROWS=1000000 SNAPSHOT_READERS=1,8,32 cargo run --release

use anyhow::{Context, Result};
use sqlite_snapshot::config::BenchConfig;
use sqlite_snapshot::dataset::{self, create_source_database, generate_rows};
use sqlite_snapshot::logging::initialize_logger;
use sqlite_snapshot::report::{print_report, WorkloadResult};
use sqlite_snapshot::workload::{run_point_reads, ReadTarget, WorkloadParams};
use sqlite_snapshot::{load_snapshot, MemoryStoreId, SnapshotConfig};
use std::process;
use std::time::Instant;

const WARMUP_QUERIES: usize = 1_000;

fn run_suite(
    target: ReadTarget<'_>,
    table: &str,
    config: &BenchConfig,
    max_id: i64,
) -> Result<Vec<WorkloadResult>> {
    // Warm the page cache so the first measured run is not penalized.
    run_point_reads(
        target,
        table,
        &WorkloadParams {
            readers: 1,
            queries_per_reader: WARMUP_QUERIES,
            max_id,
            seed: 0,
        },
    )?;

    let mut results = Vec::new();
    for &readers in &config.reader_counts {
        eprint!("  Benchmarking {}/{}...", target.label(), readers);
        let r = run_point_reads(
            target,
            table,
            &WorkloadParams {
                readers,
                queries_per_reader: config.queries_per_reader,
                max_id,
                seed: dataset::SEED ^ readers as u64,
            },
        )?;
        eprintln!(" done ({:.1}µs mean)", r.mean_us());
        results.push(r);
    }
    Ok(results)
}

fn ensure_source(config: &BenchConfig) -> Result<()> {
    if config.source_path.exists() && !config.rebuild {
        log::info!("Reusing source database {}", config.source_path.display());
        return Ok(());
    }
    let rows = generate_rows(config.rows, dataset::SEED);
    create_source_database(&config.source_path, &rows)
}

fn run(config: &BenchConfig) -> Result<()> {
    println!("Running SQLite memory-snapshot read benchmark...");
    println!("  Source:             {}", config.source_path.display());
    println!("  Readers:            {:?}", config.reader_counts);
    println!("  Queries per reader: {}", config.queries_per_reader);

    ensure_source(config)?;

    let snapshot_config = SnapshotConfig::default();
    let store = MemoryStoreId::unique("bench");

    let started = Instant::now();
    let snapshot = load_snapshot(&config.source_path, &store, &snapshot_config)
        .context("load memory snapshot")?;
    let load_time = started.elapsed();

    let max_id = snapshot.row_count() as i64;
    let table = snapshot.table().to_string();
    let readers = snapshot.readers();

    let mut results = Vec::new();
    results.extend(run_suite(
        ReadTarget::Disk(&config.source_path),
        &snapshot_config.source_table,
        config,
        max_id,
    )?);
    results.extend(run_suite(
        ReadTarget::Snapshot(&readers),
        &table,
        config,
        max_id,
    )?);

    print_report(load_time, snapshot.row_count(), &results);
    snapshot.close()?;
    Ok(())
}

fn main() {
    // A missing .env is fine; the environment alone is enough.
    let _ = dotenvy::dotenv();

    let config = BenchConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {e:#}. Exiting.");
        process::exit(1);
    });

    initialize_logger(config.log_level, config.log_file.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logger: {e:#}. Exiting.");
        process::exit(1);
    });

    if let Err(e) = run(&config) {
        log::error!("Benchmark failed: {e:#}");
        process::exit(1);
    }
}
