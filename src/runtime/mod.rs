//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over the file system,
//! enabling dependency injection and testability. The installer, the
//! installed-version store and the catalog loader all go through [`Runtime`]
//! instead of touching `std::fs` directly, so every component can be tested
//! against `MockRuntime`.

mod fs;

use anyhow::Result;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // File system
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>>;

    // Directories
    fn data_dir(&self) -> Option<PathBuf>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.open_impl(path)
    }

    fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir_impl()
    }
}
