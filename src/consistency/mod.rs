//! Cross-package consistency checking.
//!
//! If two packages carry different versions of the same item, loading them
//! becomes order-dependent, which is unsafe. [`verify_consistency`] replays
//! every configured package through a non-committing importer and indexes
//! each item's last-modified timestamp under its identity key; the first
//! package to contribute a key sets the reference value, and any later
//! disagreement is a fatal conflict, never a resolution.
//!
//! The check compares timestamps only: two items with identical timestamps
//! but divergent content are not flagged. That weaker guarantee is inherited
//! deliberately from the importer library's audit model.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use crate::artifact::ArtifactResolver;
use crate::catalog::PackageCatalog;
use crate::error::Error;
use crate::importer::{ImportedItem, ImporterFactory};

/// Item identity key -> first-seen timestamp and owning package names.
///
/// Built fresh per validation run; never evicts.
#[derive(Debug, Default)]
pub struct ConsistencyIndex {
    last_modified: BTreeMap<String, DateTime<Utc>>,
    packages: BTreeMap<String, BTreeSet<String>>,
}

impl ConsistencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an item and all of its related items for `package_name`.
    ///
    /// Related items are flattened with a worklist (no recursion, arbitrary
    /// nesting depth) and each one is indexed as if it were top-level.
    pub fn add_item(&mut self, item: &ImportedItem, package_name: &str) -> Result<(), Error> {
        let mut work = vec![item];
        while let Some(item) = work.pop() {
            self.index_one(item, package_name)?;
            work.extend(item.related_items.iter());
        }
        Ok(())
    }

    fn index_one(&mut self, item: &ImportedItem, package_name: &str) -> Result<(), Error> {
        let key = item.key();
        // An item without any auditable timestamp defeats the whole
        // guarantee, so it fails loudly instead of being skipped.
        let stamp = item
            .date_changed
            .or(item.date_created)
            .ok_or_else(|| Error::MissingTimestamp { key: key.clone() })?;

        let owners = self.packages.entry(key.clone()).or_default();
        owners.insert(package_name.to_string());

        match self.last_modified.get(&key) {
            None => {
                self.last_modified.insert(key, stamp);
            }
            Some(existing) if *existing != stamp => {
                return Err(Error::ConsistencyConflict {
                    key,
                    packages: owners.clone(),
                });
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Number of distinct item identity keys observed.
    pub fn len(&self) -> usize {
        self.last_modified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_modified.is_empty()
    }

    /// Keys contributed by more than one distinct package, with their owners.
    pub fn shared_items(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.packages
            .iter()
            .filter(|(_, owners)| owners.len() > 1)
            .map(|(key, owners)| (key.clone(), owners.clone()))
            .collect()
    }
}

/// Outcome of a successful validation run.
#[derive(Debug)]
pub struct ConsistencyReport {
    /// Total number of distinct item identity keys across the catalog.
    pub distinct_items: usize,
    /// Keys occurring in more than one package, with the owning packages.
    pub shared: BTreeMap<String, BTreeSet<String>>,
}

/// Replay every catalog package through a non-committing importer and check
/// that no item appears with two different timestamps in two packages.
///
/// The first conflict (or missing timestamp) aborts the whole run: a
/// conflicting configuration is order-dependent and must be fixed before any
/// installation is attempted.
pub fn verify_consistency(
    catalog: &PackageCatalog,
    resolver: &dyn ArtifactResolver,
    factory: &dyn ImporterFactory,
) -> Result<ConsistencyReport> {
    let mut index = ConsistencyIndex::new();

    for pkg in &catalog.packages {
        let filename = pkg.filename();
        debug!("Inspecting {}", filename);

        let stream = resolver
            .resolve(&filename)?
            .ok_or_else(|| Error::MissingArtifact {
                filename: filename.clone(),
                group_id: pkg.group_id.clone(),
            })?;

        let mut importer = factory.new_importer();
        importer.configure(pkg.import_mode);
        importer.load(stream).map_err(|source| Error::ImportFailure {
            filename: filename.clone(),
            source,
        })?;

        for group in importer.imported_item_groups()? {
            for item in &group {
                index.add_item(item, &pkg.name)?;
            }
        }

        debug!(
            "Finished {}. Running total of distinct items: {}",
            filename,
            index.len()
        );
    }

    let shared = index.shared_items();
    info!("Number of distinct items in multiple packages: {}", shared.len());
    info!("Total number of distinct items: {}", index.len());

    Ok(ConsistencyReport {
        distinct_items: index.len(),
        shared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MockArtifactResolver;
    use crate::catalog::PackageCatalog;
    use crate::importer::{MockImporterFactory, MockPackageImporter};
    use crate::test_utils::{descriptor, item, item_with_related};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_first_package_sets_reference_timestamp() {
        let mut index = ConsistencyIndex::new();
        index
            .add_item(&item("Concept", "u1", Some(ts(100)), None), "Core")
            .unwrap();
        index
            .add_item(&item("Concept", "u1", Some(ts(100)), None), "Forms")
            .unwrap();

        assert_eq!(index.len(), 1);
        let shared = index.shared_items();
        assert_eq!(shared.len(), 1);
        let owners = &shared["Concept:u1"];
        assert!(owners.contains("Core") && owners.contains("Forms"));
    }

    #[test]
    fn test_conflicting_timestamps_are_fatal() {
        let mut index = ConsistencyIndex::new();
        index
            .add_item(&item("Concept", "u1", Some(ts(100)), None), "Core")
            .unwrap();

        let err = index
            .add_item(&item("Concept", "u1", Some(ts(200)), None), "Forms")
            .unwrap_err();

        match err {
            Error::ConsistencyConflict { key, packages } => {
                assert_eq!(key, "Concept:u1");
                assert!(packages.contains("Core"));
                assert!(packages.contains("Forms"));
            }
            other => panic!("Expected ConsistencyConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_created_timestamp_is_the_fallback() {
        let mut index = ConsistencyIndex::new();
        // date_changed absent: date_created is the effective timestamp
        index
            .add_item(&item("Concept", "u1", None, Some(ts(50))), "Core")
            .unwrap();
        index
            .add_item(&item("Concept", "u1", None, Some(ts(50))), "Forms")
            .unwrap();
        assert_eq!(index.len(), 1);

        // ...and it conflicts like any other timestamp
        let err = index
            .add_item(&item("Concept", "u1", None, Some(ts(60))), "Other")
            .unwrap_err();
        assert!(matches!(err, Error::ConsistencyConflict { .. }));
    }

    #[test]
    fn test_missing_timestamp_fails_loudly() {
        let mut index = ConsistencyIndex::new();
        let err = index
            .add_item(&item("Concept", "u1", None, None), "Core")
            .unwrap_err();
        assert!(matches!(err, Error::MissingTimestamp { .. }));
    }

    #[test]
    fn test_related_items_are_flattened() {
        // One item with two related sub-items indexes as three entries
        let composite = item_with_related(
            item("Form", "f1", Some(ts(10)), None),
            vec![
                item("FormField", "ff1", Some(ts(10)), None),
                item("Field", "fld1", Some(ts(10)), None),
            ],
        );

        let mut index = ConsistencyIndex::new();
        index.add_item(&composite, "Forms").unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_related_items_are_subject_to_the_conflict_rule() {
        let composite = item_with_related(
            item("Form", "f1", Some(ts(10)), None),
            vec![item("Field", "fld1", Some(ts(20)), None)],
        );

        let mut index = ConsistencyIndex::new();
        index.add_item(&composite, "Forms").unwrap();

        // Another package carries the related item with a different stamp
        let err = index
            .add_item(&item("Field", "fld1", Some(ts(30)), None), "Core")
            .unwrap_err();
        assert!(matches!(err, Error::ConsistencyConflict { .. }));
    }

    #[test]
    fn test_deeply_nested_related_items() {
        // related items of related items are indexed too
        let nested = item_with_related(
            item("Form", "f1", Some(ts(10)), None),
            vec![item_with_related(
                item("FormField", "ff1", Some(ts(10)), None),
                vec![item("Field", "fld1", Some(ts(10)), None)],
            )],
        );

        let mut index = ConsistencyIndex::new();
        index.add_item(&nested, "Forms").unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_identical_timestamps_with_divergent_content_pass() {
        // Accepted limitation: the check compares timestamps, not content.
        let mut index = ConsistencyIndex::new();
        index
            .add_item(&item("Concept", "u1", Some(ts(100)), None), "Core")
            .unwrap();
        // Same key and stamp but different created date; still no conflict.
        index
            .add_item(&item("Concept", "u1", Some(ts(100)), Some(ts(1))), "Forms")
            .unwrap();
        assert_eq!(index.len(), 1);
    }

    fn factory_yielding(groups: Vec<Vec<ImportedItem>>) -> MockImporterFactory {
        let mut factory = MockImporterFactory::new();
        factory.expect_new_importer().returning(move || {
            let groups = groups.clone();
            let mut importer = MockPackageImporter::new();
            importer.expect_configure().return_const(());
            importer.expect_load().returning(|_| Ok(()));
            importer
                .expect_imported_item_groups()
                .returning(move || Ok(groups.clone()));
            // No commit on the validation path
            Box::new(importer)
        });
        factory
    }

    fn resolver_always() -> MockArtifactResolver {
        let mut resolver = MockArtifactResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Ok(Some(Box::new(std::io::Cursor::new(b"pkg".to_vec())))));
        resolver
    }

    #[test]
    fn test_verify_consistency_reports_shared_items() {
        let catalog = PackageCatalog {
            packages: vec![descriptor("Core", 1, "g1"), descriptor("Forms", 1, "g2")],
        };

        // Both packages contribute Concept:u1 with the same timestamp
        let factory = factory_yielding(vec![vec![
            item("Concept", "u1", Some(ts(100)), None),
        ]]);
        let resolver = resolver_always();

        let report = verify_consistency(&catalog, &resolver, &factory).unwrap();
        assert_eq!(report.distinct_items, 1);
        assert_eq!(report.shared.len(), 1);
        let owners = &report.shared["Concept:u1"];
        assert!(owners.contains("Core") && owners.contains("Forms"));
    }

    #[test]
    fn test_verify_consistency_aborts_on_conflict() {
        let catalog = PackageCatalog {
            packages: vec![descriptor("Core", 1, "g1"), descriptor("Forms", 1, "g2")],
        };

        // Importers yield a different timestamp depending on the package
        let mut factory = MockImporterFactory::new();
        let mut call = 0;
        factory.expect_new_importer().returning_st(move || {
            call += 1;
            let stamp = if call == 1 { ts(100) } else { ts(200) };
            let mut importer = MockPackageImporter::new();
            importer.expect_configure().return_const(());
            importer.expect_load().returning(|_| Ok(()));
            importer
                .expect_imported_item_groups()
                .returning(move || Ok(vec![vec![item("Concept", "u1", Some(stamp), None)]]));
            Box::new(importer)
        });
        let resolver = resolver_always();

        let err = verify_consistency(&catalog, &resolver, &factory).unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        match err {
            Error::ConsistencyConflict { key, packages } => {
                assert_eq!(key, "Concept:u1");
                assert!(packages.contains("Core"));
                assert!(packages.contains("Forms"));
            }
            other => panic!("Expected ConsistencyConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_consistency_requires_every_artifact() {
        let catalog = PackageCatalog {
            packages: vec![descriptor("Core", 1, "g1")],
        };

        let mut resolver = MockArtifactResolver::new();
        resolver.expect_resolve().returning(|_| Ok(None));
        let factory = MockImporterFactory::new();

        let err = verify_consistency(&catalog, &resolver, &factory).unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert!(matches!(err, Error::MissingArtifact { .. }));
    }
}
