//! The per-photo state machine.
//!
//! ```text
//! pending --start--> processing --ok--> completed
//!                               \--err--> failed
//! ```
//!
//! `start` claims the photo with an atomic compare-and-set in the store,
//! publishes the `processing` event and dispatches the run as its own
//! task. The run ends in exactly one terminal transition, persisted
//! before it is published. Nothing a run does can surface as an error or
//! panic to the caller of `start`.

use std::sync::Arc;

use caliper_pipeline::MeasureOutcome;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::ServiceError;
use crate::images::ImageSource;
use crate::model::{Measurement, NewPhoto, Photo, PhotoId, PhotoStatus};
use crate::notify::{Notifier, PhotoEvent};
use crate::runner::{MeasureService, RunRequest, Runner};
use crate::settings::{IntakeSettings, Settings};
use crate::store::{Claim, PhotoStore};

/// Handle to a dispatched run. Dropping it detaches the run.
#[derive(Debug)]
pub struct RunHandle(JoinHandle<()>);

impl RunHandle {
    /// Wait for the run to reach its terminal state.
    ///
    /// # Errors
    ///
    /// Returns the join error if the run task was cancelled or panicked.
    pub async fn finished(self) -> Result<(), tokio::task::JoinError> {
        self.0.await
    }
}

/// Drives photos through the pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn PhotoStore>,
    notifier: Arc<dyn Notifier>,
    runner: Runner,
    intake: IntakeSettings,
}

impl Orchestrator {
    /// Wire an orchestrator from validated settings.
    pub fn new(
        store: Arc<dyn PhotoStore>,
        images: Arc<dyn ImageSource>,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Self {
        let measure = MeasureService::new(
            images,
            Arc::new(settings.references.clone()),
            Arc::new(settings.pipeline.clone()),
        );
        Self {
            inner: Arc::new(Inner {
                store,
                notifier,
                runner: Runner::new(measure, &settings.runner),
                intake: settings.intake.clone(),
            }),
        }
    }

    /// Register an upload and start processing it.
    ///
    /// Returns the photo as stored (pending) and the handle of its run.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidUpload`] if intake checks fail and
    /// [`ServiceError::Persistence`] if the photo cannot be stored.
    pub async fn submit(&self, upload: NewPhoto) -> Result<(Photo, RunHandle), ServiceError> {
        let photo = self.register(upload).await?;
        let run = self.start(photo.id()).await?;
        Ok((photo, run))
    }

    /// Store an upload as a pending photo without starting it.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub async fn register(&self, upload: NewPhoto) -> Result<Photo, ServiceError> {
        self.inner.intake.check(&upload)?;
        let photo = Photo::new(upload);
        self.inner.store.insert(photo.clone()).await?;
        info!(photo_id = %photo.id(), location = %photo.storage_location(), "photo submitted");
        Ok(photo)
    }

    /// Move a pending photo to processing and dispatch its run.
    ///
    /// Returns as soon as the run is dispatched.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotPending`] if the photo is in any other state;
    ///   nothing is changed
    /// - [`ServiceError::NotFound`] if there is no such photo
    /// - [`ServiceError::Persistence`] if the store fails
    pub async fn start(&self, id: PhotoId) -> Result<RunHandle, ServiceError> {
        let photo = match self.inner.store.begin_processing(id).await? {
            Claim::Started(photo) => photo,
            Claim::NotPending(status) => return Err(ServiceError::NotPending { id, status }),
            Claim::Missing => return Err(ServiceError::NotFound(id)),
        };
        info!(photo_id = %id, status = %photo.status(), "photo processing started");
        self.inner.notifier.publish(PhotoEvent::from(&photo));

        let this = self.clone();
        let span = info_span!("pipeline_run", photo_id = %id);
        Ok(RunHandle(tokio::spawn(this.run(photo).instrument(span))))
    }

    /// Measurements of a completed photo.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotCompleted`] unless the photo is
    /// completed, [`ServiceError::NotFound`] if it does not exist.
    pub async fn measurements(&self, id: PhotoId) -> Result<Vec<Measurement>, ServiceError> {
        let photo = self.photo(id).await?;
        if photo.status() != PhotoStatus::Completed {
            return Err(ServiceError::NotCompleted {
                id,
                status: photo.status(),
            });
        }
        Ok(self.inner.store.measurements(id).await?)
    }

    /// Current record of a photo.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if it does not exist.
    pub async fn photo(&self, id: PhotoId) -> Result<Photo, ServiceError> {
        self.inner
            .store
            .load(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Photos in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Persistence`] if the store fails.
    pub async fn list_photos(&self, skip: usize, limit: usize) -> Result<Vec<Photo>, ServiceError> {
        Ok(self.inner.store.list(skip, limit).await?)
    }

    async fn run(self, mut photo: Photo) {
        match self.inner.runner.run(RunRequest::from(&photo)).await {
            Ok(outcome) => {
                if outcome.auto_detected {
                    photo.record_detected_reference(&outcome.reference_type);
                }
                self.finish_completed(photo, &outcome).await;
            }
            Err(failure) => {
                warn!(error = %failure, "photo processing failed");
                // A type detected before a later stage failed is kept.
                if let Some(detected) = failure.detected_reference() {
                    photo.record_detected_reference(detected);
                }
                self.finish_failed(photo, failure.to_string()).await;
            }
        }
    }

    async fn finish_completed(&self, processing: Photo, outcome: &MeasureOutcome) {
        let mut photo = processing.clone();
        if let Err(status) = photo.complete() {
            error!(%status, "photo left processing during its run");
            return;
        }

        let measurement = Measurement::new(photo.id(), &outcome.dimensions);
        let (length, width, area) = (measurement.length, measurement.width, measurement.area);
        match self.inner.store.complete(&photo, measurement).await {
            Ok(()) => {
                info!(
                    reference = %outcome.reference_type,
                    length,
                    width,
                    area,
                    "photo processing completed"
                );
                self.inner.notifier.publish(PhotoEvent::from(&photo));
            }
            Err(err) => {
                error!(error = %err, "failed to persist completed measurement");
                self.finish_failed(processing, format!("persistence failed: {err}"))
                    .await;
            }
        }
    }

    async fn finish_failed(&self, mut photo: Photo, reason: String) {
        if let Err(status) = photo.fail(reason) {
            error!(%status, "photo left processing during its run");
            return;
        }
        match self.inner.store.save(&photo).await {
            Ok(()) => {
                info!(
                    error = photo.error_message().unwrap_or_default(),
                    "photo marked failed"
                );
                self.inner.notifier.publish(PhotoEvent::from(&photo));
            }
            Err(err) => {
                error!(error = %err, "failed to persist failed status; giving up");
            }
        }
    }
}
