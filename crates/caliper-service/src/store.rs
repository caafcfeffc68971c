//! Persistence boundary for photos and measurements.
//!
//! The orchestrator only talks to [`PhotoStore`]. Implementations must
//! make [`begin_processing`](PhotoStore::begin_processing) an atomic
//! compare-and-set and [`complete`](PhotoStore::complete) an atomic write
//! of the photo together with its measurement.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::model::{Measurement, Photo, PhotoId, PhotoStatus};

/// Store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The photo id is not stored.
    #[error("photo {0} is not stored")]
    Missing(PhotoId),

    /// A photo with this id is already stored.
    #[error("photo {0} is already stored")]
    Duplicate(PhotoId),

    /// The backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of the `pending -> processing` compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The photo was pending and is now processing; this is the updated
    /// record.
    Started(Photo),
    /// The photo exists but was not pending. Nothing changed.
    NotPending(PhotoStatus),
    /// No such photo.
    Missing,
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Store a new photo.
    async fn insert(&self, photo: Photo) -> Result<(), StoreError>;

    /// Fetch a photo by id.
    async fn load(&self, id: PhotoId) -> Result<Option<Photo>, StoreError>;

    /// Overwrite an existing photo.
    async fn save(&self, photo: &Photo) -> Result<(), StoreError>;

    /// Atomically move a pending photo to processing.
    async fn begin_processing(&self, id: PhotoId) -> Result<Claim, StoreError>;

    /// Atomically store a completed photo and its measurement.
    async fn complete(&self, photo: &Photo, measurement: Measurement) -> Result<(), StoreError>;

    /// Measurements recorded for a photo, oldest first.
    async fn measurements(&self, id: PhotoId) -> Result<Vec<Measurement>, StoreError>;

    /// Photos in insertion order, skipping `skip` and returning at most
    /// `limit`.
    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Photo>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    photos: IndexMap<PhotoId, Photo>,
    measurements: HashMap<PhotoId, Vec<Measurement>>,
}

/// In-process [`PhotoStore`] behind a single async mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PhotoStore for MemoryStore {
    async fn insert(&self, photo: Photo) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.photos.contains_key(&photo.id()) {
            return Err(StoreError::Duplicate(photo.id()));
        }
        tables.photos.insert(photo.id(), photo);
        Ok(())
    }

    async fn load(&self, id: PhotoId) -> Result<Option<Photo>, StoreError> {
        Ok(self.tables.lock().await.photos.get(&id).cloned())
    }

    async fn save(&self, photo: &Photo) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let slot = tables
            .photos
            .get_mut(&photo.id())
            .ok_or(StoreError::Missing(photo.id()))?;
        *slot = photo.clone();
        Ok(())
    }

    async fn begin_processing(&self, id: PhotoId) -> Result<Claim, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(photo) = tables.photos.get_mut(&id) else {
            return Ok(Claim::Missing);
        };
        Ok(match photo.begin_processing() {
            Ok(()) => Claim::Started(photo.clone()),
            Err(status) => Claim::NotPending(status),
        })
    }

    async fn complete(&self, photo: &Photo, measurement: Measurement) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let slot = tables
            .photos
            .get_mut(&photo.id())
            .ok_or(StoreError::Missing(photo.id()))?;
        *slot = photo.clone();
        tables
            .measurements
            .entry(photo.id())
            .or_default()
            .push(measurement);
        Ok(())
    }

    async fn measurements(&self, id: PhotoId) -> Result<Vec<Measurement>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .measurements
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Photo>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .photos
            .values()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }
}
