//! Installed-version store: which version of each package group has been
//! installed.
//!
//! This is the only durable state the installation gate depends on. The gate
//! only reads it; it is mutated by the importer as a side effect of a
//! successful commit.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::runtime::Runtime;

/// Lookup and record of the highest version ever installed per package group.
#[cfg_attr(test, mockall::automock)]
pub trait InstalledVersionStore: Send + Sync {
    /// The highest version ever successfully installed for `group_id`, or
    /// `None` if the group has never been installed.
    fn installed_version(&self, group_id: &str) -> Result<Option<u32>>;

    /// Record a successful install of `version` for `group_id`.
    fn record_installed(&self, group_id: &str, version: u32) -> Result<()>;
}

/// File-backed store persisting a `group_id -> version` map as pretty JSON.
pub struct JsonFileStore<R: Runtime> {
    runtime: Arc<R>,
    path: PathBuf,
}

impl<R: Runtime> JsonFileStore<R> {
    pub fn new(runtime: Arc<R>, path: PathBuf) -> Self {
        Self { runtime, path }
    }

    fn load_map(&self) -> Result<BTreeMap<String, u32>> {
        if !self.runtime.exists(&self.path) {
            return Ok(BTreeMap::new());
        }
        let content = self
            .runtime
            .read_to_string(&self.path)
            .with_context(|| format!("Failed to read installed-version state {:?}", self.path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse installed-version state {:?}", self.path))
    }

    fn save_map(&self, map: &BTreeMap<String, u32>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(map)?;
        self.runtime
            .write(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to save installed-version state {:?}", self.path))
    }
}

impl<R: Runtime> InstalledVersionStore for JsonFileStore<R> {
    fn installed_version(&self, group_id: &str) -> Result<Option<u32>> {
        Ok(self.load_map()?.get(group_id).copied())
    }

    fn record_installed(&self, group_id: &str, version: u32) -> Result<()> {
        let mut map = self.load_map()?;
        map.insert(group_id.to_string(), version);
        self.save_map(&map)
    }
}
