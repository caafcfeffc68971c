//! Bounded, timed execution of pipeline runs.
//!
//! [`MeasureService`] is a tower [`Service`] that fetches a photo's bytes
//! and runs the CPU-bound pipeline on the blocking pool. [`Runner`] wraps
//! it in a `Timeout` over a `ConcurrencyLimit`, so a run's budget starts
//! only once it holds a slot.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use caliper_pipeline::{MeasureOutcome, PipelineConfig, ReferenceCatalog};
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::debug;

use crate::error::StageFailure;
use crate::images::ImageSource;
use crate::model::Photo;
use crate::settings::RunnerSettings;

/// What one run needs to know about its photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub storage_location: String,
    /// Declared reference type; `None` auto-detects.
    pub reference: Option<String>,
}

impl From<&Photo> for RunRequest {
    fn from(photo: &Photo) -> Self {
        Self {
            storage_location: photo.storage_location().to_owned(),
            reference: photo.reference_object().map(str::to_owned),
        }
    }
}

/// Fetch bytes, then measure on the blocking pool.
#[derive(Clone)]
pub struct MeasureService {
    images: Arc<dyn ImageSource>,
    catalog: Arc<ReferenceCatalog>,
    config: Arc<PipelineConfig>,
}

impl MeasureService {
    pub fn new(
        images: Arc<dyn ImageSource>,
        catalog: Arc<ReferenceCatalog>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            images,
            catalog,
            config,
        }
    }
}

impl Service<RunRequest> for MeasureService {
    type Response = MeasureOutcome;
    type Error = StageFailure;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RunRequest) -> Self::Future {
        let images = Arc::clone(&self.images);
        let catalog = Arc::clone(&self.catalog);
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let bytes = images.fetch(&request.storage_location).await?;
            debug!(
                location = %request.storage_location,
                bytes = bytes.len(),
                "image fetched"
            );

            let reference = request.reference;
            let outcome = tokio::task::spawn_blocking(move || {
                caliper_pipeline::measure(&bytes, reference.as_deref(), &catalog, &config)
            })
            .await
            .map_err(|err| StageFailure::Worker(err.to_string()))??;

            debug!(
                reference = %outcome.reference_type,
                auto_detected = outcome.auto_detected,
                pixels_per_unit = outcome.pixels_per_unit,
                outline_points = outcome.outline_points,
                "pipeline finished"
            );
            Ok(outcome)
        })
    }
}

/// The shared work queue every run goes through.
#[derive(Clone)]
pub struct Runner {
    service: BoxCloneSyncService<RunRequest, MeasureOutcome, BoxError>,
    timeout: Duration,
}

impl Runner {
    pub fn new(measure: MeasureService, settings: &RunnerSettings) -> Self {
        let timeout = settings.run_timeout();
        let service = ServiceBuilder::new()
            .timeout(timeout)
            .concurrency_limit(settings.max_concurrent_runs)
            .service(measure);
        Self {
            service: BoxCloneSyncService::new(service),
            timeout,
        }
    }

    /// Wait for a slot, then run within the time budget.
    ///
    /// # Errors
    ///
    /// Returns the [`StageFailure`] of the failing stage, or
    /// [`StageFailure::TimedOut`] when the budget runs out.
    pub async fn run(&self, request: RunRequest) -> Result<MeasureOutcome, StageFailure> {
        self.service
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| self.classify(err))
    }

    fn classify(&self, err: BoxError) -> StageFailure {
        if err.is::<tower::timeout::error::Elapsed>() {
            return StageFailure::TimedOut(self.timeout);
        }
        match err.downcast::<StageFailure>() {
            Ok(failure) => *failure,
            Err(other) => StageFailure::Worker(other.to_string()),
        }
    }
}
