//! Discovery and loading of export files, with a time-limited cache.

use crate::config::SourceConfig;
use crate::error::{BudgetError, Result};
use crate::sanitize::{drop_repeated_headers, parse_table};
use crate::schema::{RawRow, RawTable};
use glob::{glob, Pattern};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Files matching the configured pattern, sorted by path.
pub fn discover_files(source: &SourceConfig) -> Result<Vec<PathBuf>> {
    let directory = Pattern::escape(&source.directory.to_string_lossy());
    let pattern = format!("{}/{}", directory.trim_end_matches('/'), source.file_pattern);

    let mut files: Vec<PathBuf> = glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable path while globbing: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(BudgetError::NoInputFiles {
            directory: source.directory.display().to_string(),
            pattern: source.file_pattern.clone(),
        });
    }
    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_table(path: &Path, name: &str) -> Result<RawTable> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    parse_table(&text, name)
}

/// Loads one file. A file that cannot be read or parsed becomes a single
/// error-marker row so the rest of the batch still loads.
pub fn load_file(path: &Path) -> RawTable {
    let name = display_name(path);
    match read_table(path, &name) {
        Ok(table) => {
            debug!("{}: {} rows, {} columns", name, table.len(), table.columns.len());
            table
        }
        Err(e) => {
            warn!("{}: could not be loaded: {}", name, e);
            RawTable::new(Vec::new(), vec![RawRow::error_marker(name, e.to_string())])
        }
    }
}

/// Loads and concatenates every file, then removes header rows repeated
/// across file boundaries.
pub fn load_tables(files: &[PathBuf]) -> RawTable {
    let tables: Vec<RawTable> = files.iter().map(|path| load_file(path)).collect();
    drop_repeated_headers(RawTable::concat(tables))
}

/// What a cached load was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl FileFingerprint {
    pub fn of(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        Self {
            path: path.to_path_buf(),
            modified: metadata.as_ref().and_then(|m| m.modified().ok()),
            len: metadata.map(|m| m.len()).unwrap_or(0),
        }
    }
}

struct CacheEntry {
    fingerprints: Vec<FileFingerprint>,
    loaded_at: Instant,
    generation: u64,
    table: RawTable,
}

/// Keeps the last loaded table until the TTL runs out, a file changes, or
/// the cache is invalidated.
pub struct LoadCache {
    ttl: Duration,
    generation: u64,
    loads: usize,
    entry: Option<CacheEntry>,
}

impl LoadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: 0,
            loads: 0,
            entry: None,
        }
    }

    pub fn with_ttl_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Forces the next `load` to read the files again.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.entry = None;
        info!("Load cache invalidated (generation {})", self.generation);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of times files were actually read.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn load(&mut self, source: &SourceConfig) -> Result<RawTable> {
        let files = discover_files(source)?;
        let fingerprints: Vec<FileFingerprint> =
            files.iter().map(|path| FileFingerprint::of(path)).collect();

        if let Some(entry) = &self.entry {
            let fresh = entry.generation == self.generation
                && entry.loaded_at.elapsed() < self.ttl
                && entry.fingerprints == fingerprints;
            if fresh {
                debug!("Reusing cached table ({} rows)", entry.table.len());
                return Ok(entry.table.clone());
            }
        }

        info!(
            "Loading {} files from {}",
            files.len(),
            source.directory.display()
        );
        let table = load_tables(&files);
        self.loads += 1;
        self.entry = Some(CacheEntry {
            fingerprints,
            loaded_at: Instant::now(),
            generation: self.generation,
            table: table.clone(),
        });
        Ok(table)
    }
}
