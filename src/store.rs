//! Named in-memory store identifiers.
//!
//! A store is addressed as `file:<name>?mode=memory&cache=shared`, so every
//! connection opened with the same name inside this process sees the same
//! database. The database lives until the last such connection closes.

use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STORE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryStoreId {
    name: String,
}

impl MemoryStoreId {
    /// Use a caller-chosen name. Characters with meaning inside a URI are
    /// replaced so the name always maps to exactly one store.
    pub fn named(name: &str) -> Self {
        let name = name
            .chars()
            .map(|c| match c {
                '?' | '#' | '%' | '&' | '/' => '_',
                c => c,
            })
            .collect();
        Self { name }
    }

    /// A name no other call in this process has returned.
    pub fn unique(prefix: &str) -> Self {
        let n = NEXT_STORE.fetch_add(1, Ordering::Relaxed);
        Self::named(&format!("{prefix}-{}-{n}", std::process::id()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> String {
        format!("file:{}?mode=memory&cache=shared", self.name)
    }

    /// Open a connection to the store, creating it if no connection holds it.
    pub fn open(&self) -> rusqlite::Result<Connection> {
        Connection::open_with_flags(
            self.uri(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }
}

impl fmt::Display for MemoryStoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Read-only `file:` URI for a durable database, suitable for ATTACH on a
/// connection opened with `SQLITE_OPEN_URI`. `None` for non-UTF-8 paths.
///
/// Leading slashes collapse to one; `file://x/...` would name host `x`.
pub fn read_only_uri(path: &Path) -> Option<String> {
    let text = path.to_str()?;
    let mut uri = String::from("file:");
    let rest = text.trim_start_matches('/');
    if rest.len() != text.len() {
        uri.push('/');
    }
    for c in rest.chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            c => uri.push(c),
        }
    }
    uri.push_str("?mode=ro");
    Some(uri)
}
