//! Installation gate and batch orchestrator.
//!
//! [`install_if_needed`] decides per package whether installation is needed,
//! based on the installed version recorded for the package group, and drives
//! the importer when it is. [`install_all`] runs a whole catalog through the
//! gate, isolating per-package failures so the batch installs everything it
//! safely can.

use anyhow::Result;
use log::{debug, error, info};
use std::sync::Mutex;
use std::time::Instant;

use crate::artifact::ArtifactResolver;
use crate::catalog::{PackageCatalog, PackageDescriptor, artifact_version};
use crate::error::Error;
use crate::importer::ImporterFactory;
use crate::store::InstalledVersionStore;

// Installation mutates the installed-version record, so at most one batch
// may proceed at a time; concurrent callers block on this lock.
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Install the package described by `pkg` unless the installed version for
/// its group is already `>=` the artifact's version.
///
/// Returns `Ok(true)` if the package was imported, `Ok(false)` if it was
/// skipped as already installed. Errors are fatal for this package only;
/// the orchestrator logs them and continues with the next descriptor.
pub fn install_if_needed(
    pkg: &PackageDescriptor,
    store: &dyn InstalledVersionStore,
    resolver: &dyn ArtifactResolver,
    factory: &dyn ImporterFactory,
) -> Result<bool> {
    let filename = pkg.filename();
    let file_version = artifact_version(&filename)?;

    if let Some(installed) = store.installed_version(&pkg.group_id)?
        && installed >= file_version
    {
        info!(
            "Metadata package {} is already installed with version {}",
            pkg.name, installed
        );
        return Ok(false);
    }

    let stream = resolver
        .resolve(&filename)?
        .ok_or_else(|| Error::MissingArtifact {
            filename: filename.clone(),
            group_id: pkg.group_id.clone(),
        })?;

    info!("About to import metadata package: {}", filename);
    let timer = Instant::now();
    let mut importer = factory.new_importer();
    importer.configure(pkg.import_mode);

    debug!("...loading package: {}", filename);
    importer.load(stream).map_err(|source| Error::ImportFailure {
        filename: filename.clone(),
        source,
    })?;

    debug!("...committing package: {}", filename);
    importer.commit().map_err(|source| Error::ImportFailure {
        filename: filename.clone(),
        source,
    })?;

    info!("Imported {} in {:?}", filename, timer.elapsed());
    Ok(true)
}

/// Run every catalog package through the installation gate, in catalog order.
///
/// Per-package failures are logged and counted as "no change"; they never
/// abort the batch. Returns whether any package was actually imported.
/// Serialized process-wide: concurrent batches block rather than race on
/// the version check.
pub fn install_all(
    catalog: &PackageCatalog,
    store: &dyn InstalledVersionStore,
    resolver: &dyn ArtifactResolver,
    factory: &dyn ImporterFactory,
) -> Result<bool> {
    let _guard = INSTALL_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut any_changes = false;
    for pkg in &catalog.packages {
        match install_if_needed(pkg, store, resolver, factory) {
            Ok(changed) => any_changes |= changed,
            Err(e) => {
                error!(
                    "Failed to install metadata package {}: {:#}",
                    pkg.filename(),
                    e
                );
            }
        }
    }

    Ok(any_changes)
}

/// Install only the catalog packages whose `name` is in `names_to_keep`.
///
/// Useful when a deployment needs one specific package loaded, e.g. in a
/// test environment.
pub fn install_subset(
    catalog: &PackageCatalog,
    names_to_keep: &[String],
    store: &dyn InstalledVersionStore,
    resolver: &dyn ArtifactResolver,
    factory: &dyn ImporterFactory,
) -> Result<bool> {
    let mut subset = catalog.clone();
    subset.retain_named(names_to_keep);
    install_all(&subset, store, resolver, factory)
}
