//! SQLite Memory-Snapshot Loader
//!
//! Copies one table from a disk-backed SQLite database into a named,
//! shared-cache in-memory store, tunes the store for read-only traffic and
//! hands back a [`loader::Snapshot`] that concurrent readers can open
//! connections against.
//!
//! The runner binary builds a synthetic source, loads it and compares point
//! lookup latency on disk against the snapshot at several reader counts.
//!
//! Run benchmarks: `cargo bench`
//! Run the comparison: `cargo run --release`
//! Run tests: `cargo test`

pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod logging;
pub mod pragmas;
pub mod report;
pub mod store;
pub mod workload;

pub use error::LoadError;
pub use loader::{load_snapshot, Snapshot, SnapshotConfig, SnapshotReaders};
pub use pragmas::MemoryPragmas;
pub use store::MemoryStoreId;
