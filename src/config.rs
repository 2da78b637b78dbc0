use log::{info, warn};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::template::Templates;

// Constants
const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DATA_DIR: &str = "database";
const TEMPLATES_FILE: &str = "templates.json";

/// Backing store for master tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Per-browser tables in process memory
    Memory,
    /// Per-browser tables as gzip files under the data directory
    File,
}

/// Runtime configuration of the web application
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the server listens on
    pub addr: String,
    /// Directory holding the file store and the templates file
    pub data_dir: PathBuf,
    pub store: StoreKind,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: DEFAULT_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            store: StoreKind::Memory,
        }
    }
}

impl Config {
    /// Read `DEXCEL_ADDR`, `DEXCEL_DATA_DIR` and `DEXCEL_STORE`, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        if let Some(addr) = lookup("DEXCEL_ADDR") {
            config.addr = addr;
        }
        if let Some(dir) = lookup("DEXCEL_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(store) = lookup("DEXCEL_STORE") {
            config.store = match store.trim().to_lowercase().as_str() {
                "file" => StoreKind::File,
                "memory" => StoreKind::Memory,
                other => {
                    warn!("unknown DEXCEL_STORE '{}', using memory", other);
                    StoreKind::Memory
                }
            };
        }
        config
    }

    pub fn templates_path(&self) -> PathBuf {
        self.data_dir.join(TEMPLATES_FILE)
    }
}

/// Load the snippet templates from `path`
///
/// A missing file yields the default templates. A file that exists but does
/// not parse is an error.
pub fn load_templates(path: &Path) -> Result<Templates> {
    if !path.exists() {
        info!("{} not found, using default templates", path.display());
        return Ok(Templates::default());
    }
    let contents = fs::read_to_string(path)?;
    let templates: Templates = serde_json::from_str(&contents)?;
    Ok(templates)
}

/// Validate and write the snippet templates to `path`.
pub fn save_templates(path: &Path, templates: &Templates) -> Result<()> {
    templates.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(templates)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_without_environment() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.addr, "127.0.0.1:3000");
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.templates_path(), PathBuf::from("database/templates.json"));
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DEXCEL_ADDR", "0.0.0.0:8080"),
            ("DEXCEL_DATA_DIR", "/tmp/dexcel"),
            ("DEXCEL_STORE", "File"),
        ]);
        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.addr, "0.0.0.0:8080");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/dexcel"));
        assert_eq!(config.store, StoreKind::File);
    }

    #[test]
    fn templates_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("templates.json");
        assert_eq!(load_templates(&path).unwrap(), Templates::default());

        let custom = Templates {
            convertita: "Si {NOME}".to_string(),
            non_convertita: "No {NOME}".to_string(),
        };
        save_templates(&path, &custom).unwrap();
        assert_eq!(load_templates(&path).unwrap(), custom);
    }

    #[test]
    fn invalid_templates_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        let bad = Templates {
            convertita: "{EMAIL}".to_string(),
            ..Templates::default()
        };
        assert!(matches!(
            save_templates(&path, &bad),
            Err(DbError::UnknownPlaceholder(_))
        ));
        assert!(!path.exists());
    }
}
