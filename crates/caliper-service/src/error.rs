//! Service error types.

use std::time::Duration;

use caliper_pipeline::MeasureError;

use crate::images::ImageSourceError;
use crate::model::{PhotoId, PhotoStatus};
use crate::store::StoreError;

/// Errors returned to callers of the [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// `start` was called on a photo that is not pending. Nothing changed.
    #[error("photo {id} is {status}, not pending")]
    NotPending { id: PhotoId, status: PhotoStatus },

    /// No photo with this id exists.
    #[error("photo {0} not found")]
    NotFound(PhotoId),

    /// Measurements were requested before the photo completed.
    #[error("photo {id} is {status}; measurements are only available once completed")]
    NotCompleted { id: PhotoId, status: PhotoStatus },

    /// The upload failed intake validation.
    #[error("upload rejected: {0}")]
    InvalidUpload(String),

    /// The photo store failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Settings could not be loaded or are invalid.
    #[error("invalid settings: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Why a pipeline run failed. Rendered into the photo's error message,
/// always naming the stage.
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    /// The image bytes could not be fetched.
    #[error("image retrieval failed: {0}")]
    ImageUnavailable(#[from] ImageSourceError),

    /// A pipeline stage failed.
    #[error("{} failed: {}", .0.stage(), .0)]
    Pipeline(#[from] MeasureError),

    /// The run exceeded its wall-clock budget.
    #[error("processing timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    /// The blocking worker panicked or was cancelled.
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

impl StageFailure {
    /// Reference type detected before the run failed.
    #[must_use]
    pub fn detected_reference(&self) -> Option<&str> {
        match self {
            Self::Pipeline(err) => err.detected_reference.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caliper_pipeline::PipelineError;

    #[test]
    fn pipeline_failures_name_their_stage() {
        let failure = StageFailure::from(MeasureError::from(PipelineError::ReferenceNotFound));
        assert!(failure.detected_reference().is_none());
        let message = failure.to_string();
        assert_eq!(
            message,
            "reference detection failed: no reference object could be detected in the image"
        );
    }

    #[test]
    fn timeout_mentions_budget() {
        let message = StageFailure::TimedOut(Duration::from_secs(60)).to_string();
        assert!(message.contains("timed out"));
        assert!(message.contains("60"));
    }

    #[test]
    fn not_pending_reports_status() {
        let id = PhotoId::new();
        let message = ServiceError::NotPending {
            id,
            status: PhotoStatus::Completed,
        }
        .to_string();
        assert!(message.contains("completed"));
        assert!(message.contains(&id.to_string()));
    }
}
