//! SQLite cache for analysis results
//!
//! Stores the partials produced from a sound file under the analyzer
//! settings used, so unchanged files are not analyzed twice. Partials are
//! kept as SDIF blobs.

use crate::error::Result;
use crate::sdif::{SdifFile, SdifFormat};
use rbe_model::{Partial, PartialList};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Summary of one cached analysis
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Path to the analyzed sound file
    pub path: PathBuf,
    /// File size in bytes (for cache invalidation)
    pub file_size: u64,
    /// File modification time as Unix timestamp (for cache invalidation)
    pub modified_time: u64,
    /// Analyzer settings the partials were produced with
    pub settings: String,
    pub partial_count: usize,
}

/// Size and modification time of a file, as used for cache keys
pub fn file_stamp(path: &Path) -> Result<(u64, u64)> {
    let meta = std::fs::metadata(path)?;
    let modified = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Ok((meta.len(), modified))
}

/// Partial cache backed by SQLite
pub struct PartialCache {
    conn: Connection,
}

impl PartialCache {
    const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL,
            settings TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            modified_time INTEGER NOT NULL,
            partial_count INTEGER NOT NULL,
            partials BLOB NOT NULL,
            analyzed_at INTEGER NOT NULL,
            UNIQUE(path, settings)
        );
        CREATE INDEX IF NOT EXISTS idx_path ON analyses(path);
    "#;

    /// Open or create a cache database at the given path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self { conn })
    }

    /// Default database location in the user's cache directory
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rbe")
            .join("partials.db")
    }

    /// Cached partials for `path` analyzed with `settings`, if the file
    /// hasn't changed since
    pub fn get(
        &self,
        path: &Path,
        file_size: u64,
        modified_time: u64,
        settings: &str,
    ) -> Result<Option<PartialList>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT partials FROM analyses
                 WHERE path = ?1 AND settings = ?2 AND file_size = ?3 AND modified_time = ?4",
                params![path.to_string_lossy().to_string(), settings, file_size, modified_time],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(bytes) => {
                let partials = SdifFile::from_bytes(&bytes)?.into_partials();
                tracing::debug!(path = %path.display(), partials = partials.len(), "cache hit");
                Ok(Some(partials))
            }
            None => Ok(None),
        }
    }

    /// Store partials, replacing any earlier result for the same file and settings
    pub fn store(
        &self,
        path: &Path,
        file_size: u64,
        modified_time: u64,
        settings: &str,
        partials: &[Partial],
    ) -> Result<()> {
        let blob = SdifFile::from_partials(partials.to_vec()).to_bytes(SdifFormat::Enhanced)?;
        let now = std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        self.conn.execute(
            r#"INSERT OR REPLACE INTO analyses
               (path, settings, file_size, modified_time, partial_count, partials, analyzed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                path.to_string_lossy().to_string(),
                settings,
                file_size,
                modified_time,
                partials.iter().filter(|p| !p.is_empty()).count() as i64,
                blob,
                now,
            ],
        )?;
        Ok(())
    }

    /// All cached analyses, sorted by path then settings
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, file_size, modified_time, settings, partial_count
             FROM analyses
             ORDER BY path ASC, settings ASC",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(CacheEntry {
                    path: PathBuf::from(row.get::<_, String>(0)?),
                    file_size: row.get(1)?,
                    modified_time: row.get(2)?,
                    settings: row.get(3)?,
                    partial_count: row.get::<_, i64>(4)? as usize,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove every analysis of a file
    pub fn remove(&self, path: &Path) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM analyses WHERE path = ?1",
            [path.to_string_lossy().to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM analyses", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_model::Breakpoint;

    fn partials() -> PartialList {
        (1..=3)
            .map(|label| {
                let mut p = Partial::with_label(label);
                let f = 100.0 * f64::from(label);
                p.insert(0.0, Breakpoint::new(f, 0.1, 0.0, 0.0));
                p.insert(0.25, Breakpoint::new(f, 0.2, 0.1, 1.0));
                p
            })
            .collect()
    }

    #[test]
    fn test_store_and_get() {
        let cache = PartialCache::in_memory().unwrap();
        let path = Path::new("/test/flute.aiff");
        cache.store(path, 1024, 1_700_000_000, "res=200", &partials()).unwrap();

        let back = cache.get(path, 1024, 1_700_000_000, "res=200").unwrap().unwrap();
        assert_eq!(back, partials());
    }

    #[test]
    fn test_invalidation() {
        let cache = PartialCache::in_memory().unwrap();
        let path = Path::new("/test/flute.aiff");
        cache.store(path, 1024, 1_700_000_000, "res=200", &partials()).unwrap();

        assert!(cache.get(path, 999, 1_700_000_000, "res=200").unwrap().is_none());
        assert!(cache.get(path, 1024, 1_800_000_000, "res=200").unwrap().is_none());
        assert!(cache.get(path, 1024, 1_700_000_000, "res=100").unwrap().is_none());
    }

    #[test]
    fn test_entries_count_remove_clear() {
        let cache = PartialCache::in_memory().unwrap();
        let a = Path::new("/test/a.aiff");
        let b = Path::new("/test/b.aiff");
        cache.store(b, 1, 1, "res=100", &partials()).unwrap();
        cache.store(a, 1, 1, "res=200", &partials()[..1]).unwrap();
        cache.store(a, 1, 1, "res=100", &partials()).unwrap();
        // replacing keeps one row per file and settings
        cache.store(a, 1, 1, "res=100", &partials()[..2]).unwrap();
        assert_eq!(cache.count().unwrap(), 3);

        let entries = cache.entries().unwrap();
        assert_eq!(entries[0].path, PathBuf::from("/test/a.aiff"));
        assert_eq!(entries[0].settings, "res=100");
        assert_eq!(entries[0].partial_count, 2);
        assert_eq!(entries[2].path, PathBuf::from("/test/b.aiff"));

        assert!(cache.remove(a).unwrap());
        assert!(!cache.remove(a).unwrap());
        assert_eq!(cache.count().unwrap(), 1);
        cache.clear().unwrap();
        assert_eq!(cache.count().unwrap(), 0);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache").join("partials.db");
        {
            let cache = PartialCache::open(&db).unwrap();
            cache.store(Path::new("x.wav"), 2, 3, "", &partials()).unwrap();
        }
        let cache = PartialCache::open(&db).unwrap();
        assert_eq!(cache.count().unwrap(), 1);
        let sound = dir.path().join("stamp.txt");
        std::fs::write(&sound, b"12345").unwrap();
        assert_eq!(file_stamp(&sound).unwrap().0, 5);
    }
}
