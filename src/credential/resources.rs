use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashMap;

use crate::{Error, Result};

/// Resolves key resource locators to readable byte streams.
pub trait ResourceContext: Send + Sync + 'static {
    /// The resolved name of `locator`, or `None` if nothing answers to it.
    fn resource_name(&self, locator: &str) -> Option<String>;

    /// Opens the resource for reading.
    fn open(&self, locator: &str) -> io::Result<Box<dyn Read + Send>>;
}

impl<T: ResourceContext + ?Sized> ResourceContext for Arc<T> {
    fn resource_name(&self, locator: &str) -> Option<String> {
        (**self).resource_name(locator)
    }

    fn open(&self, locator: &str) -> io::Result<Box<dyn Read + Send>> {
        (**self).open(locator)
    }
}

/// Resources stored as files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locators may not climb out of the root.
    fn locate(&self, locator: &str) -> Option<PathBuf> {
        let relative = Path::new(locator);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if locator.is_empty() || !contained {
            return None;
        }

        Some(self.root.join(relative))
    }
}

impl ResourceContext for DirectoryResources {
    fn resource_name(&self, locator: &str) -> Option<String> {
        let path = self.locate(locator)?;
        if path.is_file() {
            Some(path.display().to_string())
        } else {
            None
        }
    }

    fn open(&self, locator: &str) -> io::Result<Box<dyn Read + Send>> {
        let path = self.locate(locator).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no resource named {:?}", locator))
        })?;

        debug!("Opening key resource @ {:?}", &path);
        Ok(Box::new(File::open(path)?))
    }
}

/// Resources held in memory, e.g. keys pulled from a secret store.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResources {
    entries: HashMap<String, Bytes>,
}

impl EmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.entries.insert(name.into(), data.into());
        self
    }

    /// Adds a resource given as standard base64.
    pub fn with_base64_resource(self, name: impl Into<String>, encoded: &str) -> Result<Self> {
        let data = base64::decode(encoded.trim())
            .map_err(|e| Error::Security(format!("Key material is not valid base64: {}", e)))?;
        Ok(self.with_resource(name, data))
    }
}

impl ResourceContext for EmbeddedResources {
    fn resource_name(&self, locator: &str) -> Option<String> {
        self.entries
            .get_key_value(locator)
            .map(|(name, _)| name.clone())
    }

    fn open(&self, locator: &str) -> io::Result<Box<dyn Read + Send>> {
        let data = self.entries.get(locator).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no resource named {:?}", locator))
        })?;
        Ok(Box::new(Cursor::new(data)))
    }
}
