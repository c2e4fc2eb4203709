pub mod artifact;
pub mod catalog;
pub mod consistency;
pub mod error;
pub mod importer;
pub mod install;
pub mod runtime;
pub mod store;

/// Shared builders for catalog descriptors and imported items used across
/// the module tests.
#[cfg(test)]
pub mod test_utils {
    use crate::catalog::PackageDescriptor;
    use crate::importer::{ImportMode, ImportedItem};
    use chrono::{DateTime, Utc};

    pub fn descriptor(name: &str, version: u32, group_id: &str) -> PackageDescriptor {
        PackageDescriptor {
            name: name.to_string(),
            version,
            import_mode: ImportMode::Mirror,
            group_id: group_id.to_string(),
        }
    }

    pub fn item(
        class_name: &str,
        uuid: &str,
        date_changed: Option<DateTime<Utc>>,
        date_created: Option<DateTime<Utc>>,
    ) -> ImportedItem {
        ImportedItem {
            class_name: class_name.to_string(),
            uuid: uuid.to_string(),
            date_changed,
            date_created,
            related_items: vec![],
        }
    }

    pub fn item_with_related(mut item: ImportedItem, related: Vec<ImportedItem>) -> ImportedItem {
        item.related_items = related;
        item
    }
}
