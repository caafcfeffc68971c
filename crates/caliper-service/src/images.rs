//! Image byte access.
//!
//! The pipeline never touches storage; the runner fetches each photo's
//! bytes through an [`ImageSource`] keyed by its storage location.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

/// Image retrieval failures.
#[derive(Debug, thiserror::Error)]
pub enum ImageSourceError {
    /// Nothing is stored at the location.
    #[error("no image at '{0}'")]
    NotFound(String),

    /// The location escapes the source's root or is otherwise unusable.
    #[error("invalid image location '{0}'")]
    InvalidLocation(String),

    /// Reading the image failed.
    #[error("failed to read image '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Raw encoded bytes stored at `location`.
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ImageSourceError>;
}

/// Reads images from files under a root directory.
///
/// Locations are relative paths; absolute paths and `..` components are
/// rejected.
#[derive(Debug, Clone)]
pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, ImageSourceError> {
        let relative = Path::new(location);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if location.is_empty() || !plain {
            return Err(ImageSourceError::InvalidLocation(location.to_owned()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ImageSourceError> {
        let path = self.resolve(location)?;
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ImageSourceError::NotFound(location.to_owned())
            } else {
                ImageSourceError::Io {
                    location: location.to_owned(),
                    source,
                }
            }
        })
    }
}

/// Fixed set of in-memory images, built up front.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageSource {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryImageSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image at `location`, replacing any previous one.
    #[must_use]
    pub fn with_image(mut self, location: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.images.insert(location.into(), bytes);
        self
    }
}

#[async_trait]
impl ImageSource for MemoryImageSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ImageSourceError> {
        self.images
            .get(location)
            .cloned()
            .ok_or_else(|| ImageSourceError::NotFound(location.to_owned()))
    }
}
