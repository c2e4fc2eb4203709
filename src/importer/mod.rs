//! Package importer abstraction.
//!
//! The core never persists imported records itself; it drives an importer
//! through `configure` / `load` / `commit` on the install path, and through
//! `configure` / `load` / `imported_item_groups` (no commit) on the
//! validation path. A fresh importer is created per package via
//! [`ImporterFactory`].

pub mod zip;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;

pub use self::zip::{ZipImporterFactory, ZipPackageImporter};

/// Import policy passed opaquely to the importer.
///
/// The value set mirrors the import configurations of the underlying
/// metadata-sharing library; the core never interprets these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    Mirror,
    ParentAndChild,
    PeerToPeer,
    PreferTheirs,
    PreferMine,
}

/// A unit yielded by the importer when replaying a loaded package.
///
/// Identity across packages is `class_name` + `uuid`; two items with the
/// same key in different packages conceptually refer to the same record.
/// `related_items` are records pulled in transitively (e.g. children of a
/// composite) and are subject to the same consistency rules as their parent.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ImportedItem {
    pub class_name: String,
    pub uuid: String,
    #[serde(default)]
    pub date_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub related_items: Vec<ImportedItem>,
}

impl ImportedItem {
    /// Identity key: `<class_name>:<uuid>`, globally unique across packages
    /// that refer to the same record.
    pub fn key(&self) -> String {
        format!("{}:{}", self.class_name, self.uuid)
    }
}

/// External capability that loads and applies a package's contents.
///
/// The install path calls `configure`, `load`, then `commit`. The validation
/// path calls `configure`, `load`, then `imported_item_groups` and never
/// commits.
#[cfg_attr(test, mockall::automock)]
pub trait PackageImporter {
    /// Apply an import policy. Must be called before `load`.
    fn configure(&mut self, mode: ImportMode);

    /// Load a serialized package from a stream. Does not touch durable state.
    fn load(&mut self, stream: Box<dyn Read + Send>) -> Result<()>;

    /// Apply the loaded package, mutating durable state (the imported
    /// records and the installed-version record for the package group).
    fn commit(&mut self) -> Result<()>;

    /// Enumerate the item groups of the loaded package, read-only.
    fn imported_item_groups(&self) -> Result<Vec<Vec<ImportedItem>>>;
}

/// Creates a fresh importer per package.
#[cfg_attr(test, mockall::automock)]
pub trait ImporterFactory {
    fn new_importer(&self) -> Box<dyn PackageImporter>;
}
