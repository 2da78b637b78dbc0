use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{DbError, Result};
use crate::table::{self, DEFAULT_SHEET_NAME, Table};

/// Where master tables live between requests.
///
/// The engine never touches storage itself; the web layer loads a table,
/// mutates it and saves it back through this capability.
pub trait TableStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Table>>;
    fn save(&self, key: &str, table: &Table) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Tables kept in process memory, keyed by browser session
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> DbError {
    DbError::IoError(std::io::Error::other("table store lock poisoned"))
}

impl TableStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Table>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.get(key).cloned())
    }

    fn save(&self, key: &str, table: &Table) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.insert(key.to_string(), table.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.remove(key);
        Ok(())
    }
}

/// Tables written to disk as gzip-compressed JSON sheet documents
///
/// Each key maps to `<dir>/<key>.json.gz`. Keys are reduced to
/// `[A-Za-z0-9_-]` before they reach the file system.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileStore { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let name = if safe.is_empty() { "default" } else { &safe };
        self.dir.join(format!("{}.json.gz", name))
    }
}

impl TableStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Table>> {
        let path = self.path_for(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(GzDecoder::new(file));
        let mut json = String::new();
        reader.read_to_string(&mut json)?;
        debug!("loaded {}", path.display());
        table::from_json(&json).map(Some)
    }

    fn save(&self, key: &str, table: &Table) -> Result<()> {
        let path = self.path_for(key);
        let json = table::to_json(table, DEFAULT_SHEET_NAME)?;

        let file = File::create(&path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = BufWriter::new(encoder);
        writer.write_all(json.as_bytes())?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())?
            .finish()?;
        debug!("saved {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
