//! Zip-backed package importer.
//!
//! A package artifact is a zip archive carrying a `header.json` (package
//! name, group id, version) and an `items.json` (the serialized item groups,
//! an array of arrays). `load` parses both without touching durable state;
//! `commit` applies the package by recording the group's installed version
//! in the [`InstalledVersionStore`], which is exactly the side effect the
//! installation gate relies on for its next run.

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use serde::Deserialize;
use std::io::Read;
use std::sync::Arc;
use zip::ZipArchive;
use zip::result::ZipError;

use super::{ImportMode, ImportedItem, ImporterFactory, PackageImporter};
use crate::store::InstalledVersionStore;

#[derive(Debug, Deserialize)]
struct PackageHeader {
    name: String,
    group_id: String,
    version: u32,
}

struct LoadedPackage {
    header: PackageHeader,
    item_groups: Vec<Vec<ImportedItem>>,
}

pub struct ZipPackageImporter {
    store: Arc<dyn InstalledVersionStore>,
    mode: Option<ImportMode>,
    loaded: Option<LoadedPackage>,
}

impl ZipPackageImporter {
    pub fn new(store: Arc<dyn InstalledVersionStore>) -> Self {
        Self {
            store,
            mode: None,
            loaded: None,
        }
    }
}

impl PackageImporter for ZipPackageImporter {
    fn configure(&mut self, mode: ImportMode) {
        self.mode = Some(mode);
    }

    fn load(&mut self, mut stream: Box<dyn Read + Send>) -> Result<()> {
        // The zip format needs Read + Seek, so buffer the whole stream.
        let mut buffer = Vec::new();
        stream
            .read_to_end(&mut buffer)
            .context("Failed to read package stream")?;
        let cursor = std::io::Cursor::new(buffer);

        let mut archive =
            ZipArchive::new(cursor).context("Failed to parse package as a zip archive")?;

        let header: PackageHeader = {
            let entry = archive
                .by_name("header.json")
                .context("Package is missing header.json")?;
            serde_json::from_reader(entry).context("Failed to parse header.json")?
        };

        let item_groups: Vec<Vec<ImportedItem>> = match archive.by_name("items.json") {
            Ok(entry) => serde_json::from_reader(entry).context("Failed to parse items.json")?,
            Err(ZipError::FileNotFound) => Vec::new(),
            Err(e) => return Err(e).context("Failed to read items.json"),
        };

        debug!(
            "Loaded package {} (group {}) version {} with {} item group(s)",
            header.name,
            header.group_id,
            header.version,
            item_groups.len()
        );
        self.loaded = Some(LoadedPackage {
            header,
            item_groups,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| anyhow!("commit called before a package was loaded"))?;

        let items: usize = loaded.item_groups.iter().map(|g| g.len()).sum();
        self.store
            .record_installed(&loaded.header.group_id, loaded.header.version)
            .with_context(|| {
                format!(
                    "Failed to record installed version for group {}",
                    loaded.header.group_id
                )
            })?;
        info!(
            "Committed package {} version {} ({} item(s))",
            loaded.header.name, loaded.header.version, items
        );
        Ok(())
    }

    fn imported_item_groups(&self) -> Result<Vec<Vec<ImportedItem>>> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| anyhow!("imported_item_groups called before a package was loaded"))?;
        Ok(loaded.item_groups.clone())
    }
}

/// Hands out a fresh zip importer per package, all sharing one store.
pub struct ZipImporterFactory {
    store: Arc<dyn InstalledVersionStore>,
}

impl ZipImporterFactory {
    pub fn new(store: Arc<dyn InstalledVersionStore>) -> Self {
        Self { store }
    }
}

impl ImporterFactory for ZipImporterFactory {
    fn new_importer(&self) -> Box<dyn PackageImporter> {
        Box::new(ZipPackageImporter::new(Arc::clone(&self.store)))
    }
}
