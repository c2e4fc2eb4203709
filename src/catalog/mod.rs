//! Package catalog: the declarative list of metadata packages to consider.
//!
//! The catalog is an ordered list of [`PackageDescriptor`]s loaded from a
//! JSON resource (default `packages.json`). Order is significant: it is the
//! order installation runs in, and the order that decides which package is
//! "first seen" for the consistency index.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::Error;
use crate::importer::ImportMode;
use crate::runtime::Runtime;

/// Default catalog resource name.
pub const PACKAGES_FILENAME: &str = "packages.json";

/// One configured metadata package. Immutable once loaded.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Package group identifier used for the artifact filename,
    /// e.g. `Reference_Application_Visit_and_Encounter_Types`.
    pub name: String,
    /// Declared package version, monotonically increasing per group.
    pub version: u32,
    /// Import policy handed opaquely to the importer.
    pub import_mode: ImportMode,
    /// Stable identity of the package group across versions, used to look up
    /// install history. Distinct from `name` + `version` so the same group
    /// can be re-versioned.
    pub group_id: String,
}

impl PackageDescriptor {
    /// Derived artifact name: `<name>-<version>.zip`.
    pub fn filename(&self) -> String {
        format!("{}-{}.zip", self.name, self.version)
    }
}

/// Ordered package catalog.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PackageCatalog {
    pub packages: Vec<PackageDescriptor>,
}

impl PackageCatalog {
    /// Load a catalog from a JSON file via the runtime.
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Cannot find catalog at {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Error deserializing catalog {:?}", path))
    }

    /// Keep only descriptors whose `name` is listed in `names_to_keep`.
    /// Used for subset installation runs.
    pub fn retain_named(&mut self, names_to_keep: &[String]) {
        self.packages
            .retain(|pkg| names_to_keep.iter().any(|n| n == &pkg.name));
    }
}

/// Parse the trailing integer out of an artifact filename, enforcing the
/// `PackageNameWithNoSpaces-X.zip` convention. A leading directory prefix is
/// tolerated; the base name must be word characters, one `-`, digits, `.zip`.
pub fn artifact_version(filename: &str) -> Result<u32, Error> {
    let invalid = || Error::InvalidPackageFilename {
        filename: filename.to_string(),
    };

    let base = filename.rsplit('/').next().ok_or_else(invalid)?;
    let stem = base.strip_suffix(".zip").ok_or_else(invalid)?;
    let (name, digits) = stem.rsplit_once('-').ok_or_else(invalid)?;

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    digits.parse().map_err(|_| invalid())
}
