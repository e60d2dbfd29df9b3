//! Runner configuration from environment variables.
//!
//! | Variable               | Default                           |
//! |------------------------|-----------------------------------|
//! | `SNAPSHOT_SOURCE_PATH` | `<tmp>/snapshot-source.db`        |
//! | `SNAPSHOT_ROWS`        | `100000`                          |
//! | `SNAPSHOT_READERS`     | `1,2,4,8`                         |
//! | `SNAPSHOT_QUERIES`     | `10000` (per reader)              |
//! | `SNAPSHOT_REBUILD`     | unset (reuse an existing source)  |
//! | `SNAPSHOT_LOG_LEVEL`   | `info`                            |
//! | `SNAPSHOT_LOG_FILE`    | unset                             |

use anyhow::{bail, ensure, Context, Result};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    pub source_path: PathBuf,
    pub rows: usize,
    pub reader_counts: Vec<usize>,
    pub queries_per_reader: usize,
    pub rebuild: bool,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            source_path: std::env::temp_dir().join("snapshot-source.db"),
            rows: 100_000,
            reader_counts: vec![1, 2, 4, 8],
            queries_per_reader: 10_000,
            rebuild: false,
            log_level: LevelFilter::Info,
            log_file: None,
        }
    }
}

impl BenchConfig {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("SNAPSHOT_SOURCE_PATH") {
            config.source_path = PathBuf::from(path);
        }
        if let Some(rows) = lookup("SNAPSHOT_ROWS") {
            config.rows = rows
                .trim()
                .parse()
                .with_context(|| format!("SNAPSHOT_ROWS={rows} is not a count"))?;
        }
        if let Some(list) = lookup("SNAPSHOT_READERS") {
            config.reader_counts = parse_reader_counts(&list)?;
        }
        if let Some(q) = lookup("SNAPSHOT_QUERIES") {
            config.queries_per_reader = q
                .trim()
                .parse()
                .with_context(|| format!("SNAPSHOT_QUERIES={q} is not a count"))?;
        }
        if let Some(flag) = lookup("SNAPSHOT_REBUILD") {
            config.rebuild = parse_flag(&flag)?;
        }
        if let Some(level) = lookup("SNAPSHOT_LOG_LEVEL") {
            config.log_level = crate::logging::parse_level(&level)
                .with_context(|| format!("SNAPSHOT_LOG_LEVEL={level} is not a log level"))?;
        }
        config.log_file = lookup("SNAPSHOT_LOG_FILE").filter(|f| !f.trim().is_empty());

        ensure!(config.rows > 0, "SNAPSHOT_ROWS must be at least 1");
        Ok(config)
    }
}

fn parse_reader_counts(list: &str) -> Result<Vec<usize>> {
    let counts = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| -> Result<usize> {
            let n: usize = s
                .parse()
                .with_context(|| format!("reader count {s:?} is not a number"))?;
            ensure!(n > 0, "reader count must be at least 1");
            Ok(n)
        })
        .collect::<Result<Vec<_>>>()?;
    ensure!(!counts.is_empty(), "SNAPSHOT_READERS lists no reader counts");
    Ok(counts)
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("{other:?} is not a boolean"),
    }
}
