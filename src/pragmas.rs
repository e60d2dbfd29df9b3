//! Performance pragmas applied to the in-memory store once the copy is done.
//!
//! The set is a plain value so callers and tests can build, apply and check
//! it independently of the copy itself.

use crate::error::{LoadError, Result};
use rusqlite::Connection;

/// `PRAGMA journal_mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Off,
    Memory,
    Delete,
    Wal,
}

impl JournalMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Memory => "memory",
            Self::Delete => "delete",
            Self::Wal => "wal",
        }
    }
}

/// `PRAGMA synchronous` values. The discriminant is what SQLite reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synchronous {
    Off = 0,
    Normal = 1,
    Full = 2,
}

/// `PRAGMA locking_mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockingMode {
    Normal,
    Exclusive,
}

impl LockingMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Exclusive => "exclusive",
        }
    }

    /// Memory databases always run exclusive, so asking for `normal` is
    /// satisfied by either answer.
    fn accepts(self, reported: &str) -> bool {
        match self {
            Self::Exclusive => reported.eq_ignore_ascii_case("exclusive"),
            Self::Normal => true,
        }
    }
}

/// `PRAGMA temp_store` values. The discriminant is what SQLite reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempStore {
    Default = 0,
    File = 1,
    Memory = 2,
}

/// Directive set for a read-only in-memory snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPragmas {
    pub journal_mode: JournalMode,
    pub synchronous: Synchronous,
    /// Negative values are KiB, positive values are pages.
    pub cache_size: i64,
    pub locking_mode: LockingMode,
    pub temp_store: TempStore,
}

impl Default for MemoryPragmas {
    /// No journal, no fsync, 128 MiB page cache, exclusive lock, temp data
    /// in memory.
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Off,
            synchronous: Synchronous::Off,
            cache_size: -131_072,
            locking_mode: LockingMode::Exclusive,
            temp_store: TempStore::Memory,
        }
    }
}

impl MemoryPragmas {
    /// Apply all five directives in order. Directives that echo their new
    /// value (journal_mode, locking_mode) are checked on the spot.
    pub fn apply(&self, conn: &Connection) -> Result<()> {
        let journal: String = conn
            .pragma_update_and_check(
                None,
                "journal_mode",
                self.journal_mode.pragma_value(),
                |row| row.get(0),
            )
            .map_err(|source| LoadError::Pragma {
                directive: "journal_mode",
                source,
            })?;
        if !journal.eq_ignore_ascii_case(self.journal_mode.pragma_value()) {
            return Err(LoadError::PragmaRejected {
                directive: "journal_mode",
                expected: self.journal_mode.pragma_value().to_string(),
                actual: journal,
            });
        }

        conn.pragma_update(None, "synchronous", self.synchronous as i64)
            .map_err(|source| LoadError::Pragma {
                directive: "synchronous",
                source,
            })?;

        conn.pragma_update(None, "cache_size", self.cache_size)
            .map_err(|source| LoadError::Pragma {
                directive: "cache_size",
                source,
            })?;

        let locking: String = conn
            .pragma_update_and_check(
                None,
                "locking_mode",
                self.locking_mode.pragma_value(),
                |row| row.get(0),
            )
            .map_err(|source| LoadError::Pragma {
                directive: "locking_mode",
                source,
            })?;
        if !self.locking_mode.accepts(&locking) {
            return Err(LoadError::PragmaRejected {
                directive: "locking_mode",
                expected: self.locking_mode.pragma_value().to_string(),
                actual: locking,
            });
        }

        conn.pragma_update(None, "temp_store", self.temp_store as i64)
            .map_err(|source| LoadError::Pragma {
                directive: "temp_store",
                source,
            })?;

        log::debug!("Applied pragmas {:?}", self);
        Ok(())
    }

    /// True when every directive is in effect according to `report`.
    pub fn is_satisfied_by(&self, report: &PragmaReport) -> bool {
        report
            .journal_mode
            .eq_ignore_ascii_case(self.journal_mode.pragma_value())
            && report.synchronous == self.synchronous as i64
            && report.cache_size == self.cache_size
            && self.locking_mode.accepts(&report.locking_mode)
            && report.temp_store == self.temp_store as i64
    }
}

/// Pragma values as the store itself reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaReport {
    pub journal_mode: String,
    pub synchronous: i64,
    pub cache_size: i64,
    pub locking_mode: String,
    pub temp_store: i64,
}

impl PragmaReport {
    pub fn read(conn: &Connection) -> rusqlite::Result<Self> {
        Ok(Self {
            journal_mode: conn.pragma_query_value(None, "journal_mode", |r| r.get(0))?,
            synchronous: conn.pragma_query_value(None, "synchronous", |r| r.get(0))?,
            cache_size: conn.pragma_query_value(None, "cache_size", |r| r.get(0))?,
            locking_mode: conn.pragma_query_value(None, "locking_mode", |r| r.get(0))?,
            temp_store: conn.pragma_query_value(None, "temp_store", |r| r.get(0))?,
        })
    }
}
