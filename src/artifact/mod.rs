//! Artifact resolution: mapping a derived `<name>-<version>.zip` filename to
//! a readable byte stream.

use anyhow::Result;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::runtime::Runtime;

/// Resolves a package artifact by its derived filename.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactResolver: Send + Sync {
    /// Returns a stream over the artifact, or `None` if no artifact with
    /// that name exists.
    fn resolve(&self, filename: &str) -> Result<Option<Box<dyn Read + Send>>>;
}

/// Resolver that looks artifacts up in a single directory.
pub struct DirArtifactResolver<R: Runtime> {
    runtime: Arc<R>,
    dir: PathBuf,
}

impl<R: Runtime> DirArtifactResolver<R> {
    pub fn new(runtime: Arc<R>, dir: PathBuf) -> Self {
        Self { runtime, dir }
    }
}

impl<R: Runtime> ArtifactResolver for DirArtifactResolver<R> {
    fn resolve(&self, filename: &str) -> Result<Option<Box<dyn Read + Send>>> {
        let path = self.dir.join(filename);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        self.runtime.open(&path).map(Some)
    }
}
