//! Error types for metapack.
//!
//! Installation errors are scoped to a single package: the batch
//! orchestrator logs them and keeps going. Consistency errors invalidate the
//! whole validated set and always abort the run, because the guarantee they
//! police (installation order does not matter) is all-or-nothing.

use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised by the installation gate and the consistency checker.
#[derive(Error, Debug)]
pub enum Error {
    /// The derived artifact name does not follow the
    /// `PackageNameWithNoSpaces-X.zip` convention. Fatal for this package
    /// only; the batch continues.
    #[error("package filename '{filename}' must match PackageNameWithNoSpaces-X.zip")]
    InvalidPackageFilename { filename: String },

    /// A declared package version could not be resolved to an artifact.
    /// Fatal for this package only; the batch continues.
    #[error("cannot find artifact '{filename}' for group {group_id}")]
    MissingArtifact { filename: String, group_id: String },

    /// The importer failed while loading or committing a package.
    /// Fatal for this package only; the batch continues.
    #[error("failed to import package '{filename}'")]
    ImportFailure {
        filename: String,
        #[source]
        source: anyhow::Error,
    },

    /// Two packages assert different last-modified timestamps for the same
    /// item identity key. Loading such a configuration would be
    /// order-dependent, so this aborts the whole validation run.
    #[error("found inconsistent versions of {key} in {packages:?}")]
    ConsistencyConflict {
        key: String,
        packages: BTreeSet<String>,
    },

    /// An imported item carries neither a changed nor a created timestamp.
    /// The consistency guarantee cannot be established without one, so this
    /// aborts the whole validation run.
    #[error("item {key} has no last-modified or created timestamp")]
    MissingTimestamp { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = Error::InvalidPackageFilename {
            filename: "bad name.zip".to_string(),
        };
        assert!(err.to_string().contains("bad name.zip"));

        let err = Error::MissingArtifact {
            filename: "Core-2.zip".to_string(),
            group_id: "g1".to_string(),
        };
        assert!(err.to_string().contains("Core-2.zip"));
        assert!(err.to_string().contains("g1"));
    }

    #[test]
    fn test_conflict_message_names_key_and_packages() {
        let packages: BTreeSet<String> =
            ["Core".to_string(), "Forms".to_string()].into_iter().collect();
        let err = Error::ConsistencyConflict {
            key: "Concept:abc-123".to_string(),
            packages,
        };
        let msg = err.to_string();
        assert!(msg.contains("Concept:abc-123"));
        assert!(msg.contains("Core"));
        assert!(msg.contains("Forms"));
    }
}
