//! Stage data persistence
//!
//! Values saved during `deploy` are loaded back by later runs that skip it,
//! so `validate` and `cleanup` target the same resources.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name under the working directory
pub const TEST_DATA_DIR: &str = ".test-data";

/// JSON store for one suite's stage data
#[derive(Clone, Debug)]
pub struct StageStore {
    dir: PathBuf,
}

impl StageStore {
    /// Store at `<working_dir>/.test-data/<suite>`
    pub fn new(working_dir: impl AsRef<Path>, suite: &str) -> Self {
        Self {
            dir: working_dir
                .as_ref()
                .join(TEST_DATA_DIR)
                .join(suite.to_lowercase()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    /// Save a value under `key`, replacing any earlier one
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path(key);
        let file = File::create(&path).context("Failed to create stage data file")?;
        serde_json::to_writer_pretty(BufWriter::new(file), value)
            .context("Failed to write stage data")?;

        debug!("Saved stage data {} to {}", key, path.display());
        Ok(path)
    }

    /// Load the value saved under `key`
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let path = self.path(key);
        let file = File::open(&path)
            .with_context(|| format!("No stage data at {}; was deploy skipped?", path.display()))?;

        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse stage data {}", path.display()))
    }

    /// Load `key` if present
    pub fn load_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if !self.exists(key) {
            return Ok(None);
        }
        self.load(key).map(Some)
    }

    /// Remove all data for this suite
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("Failed to remove {}", self.dir.display()))?;
            info!("Cleared stage data in {}", self.dir.display());
        }
        Ok(())
    }
}
