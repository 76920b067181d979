//! Resource fetchers
//!
//! The engine does not know where stems live. A [`StemFetcher`] turns a
//! locator into raw bytes; the bytes are decoded afterwards.

use std::io;
use std::path::{Path, PathBuf};

/// Supplies the raw bytes of a stem resource
///
/// Called concurrently from the loader threads, one call per stem.
pub trait StemFetcher: Send + Sync {
    fn fetch(&self, locator: &str) -> io::Result<Vec<u8>>;
}

impl<F> StemFetcher for F
where
    F: Fn(&str) -> io::Result<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, locator: &str) -> io::Result<Vec<u8>> {
        self(locator)
    }
}

/// Reads stems from the local filesystem
///
/// Relative locators are resolved against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl StemFetcher for FileFetcher {
    fn fetch(&self, locator: &str) -> io::Result<Vec<u8>> {
        let path = self.resolve(locator);
        log::debug!("Reading stem from {:?}", path);
        std::fs::read(&path)
    }
}
