//! Photo and measurement records.
//!
//! A [`Photo`]'s status and error message can only change through its
//! transition methods, which keep the two consistent: the message is set
//! exactly when the photo has failed.

use std::fmt;

use caliper_pipeline::ObjectDimensions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Photo identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(Uuid);

impl PhotoId {
    /// Fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PhotoId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PhotoId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Processing state of a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStatus {
    /// Stored, not yet started.
    Pending,
    /// A pipeline run owns the photo.
    Processing,
    /// Measured successfully.
    Completed,
    /// A stage failed; see the error message.
    Failed,
}

impl PhotoStatus {
    /// `true` for states a photo never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name, as persisted and published.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PhotoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upload to register.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewPhoto {
    /// Where the image bytes live, resolved by the image source.
    pub storage_location: String,
    /// Declared reference type; `None` asks for auto-detection.
    pub reference_object: Option<String>,
    /// Free-form label carried through untouched.
    pub measurement_type: Option<String>,
    /// Upload size, checked against the intake limit when known.
    pub size_bytes: Option<u64>,
}

/// A photo and its processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Photo {
    id: PhotoId,
    storage_location: String,
    reference_object: Option<String>,
    measurement_type: Option<String>,
    status: PhotoStatus,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl Photo {
    /// A new pending photo.
    #[must_use]
    pub fn new(upload: NewPhoto) -> Self {
        Self {
            id: PhotoId::new(),
            storage_location: upload.storage_location,
            reference_object: upload.reference_object,
            measurement_type: upload.measurement_type,
            status: PhotoStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> PhotoId {
        self.id
    }

    #[must_use]
    pub fn storage_location(&self) -> &str {
        &self.storage_location
    }

    /// Declared reference type, or the detected one after an
    /// auto-detected run.
    #[must_use]
    pub fn reference_object(&self) -> Option<&str> {
        self.reference_object.as_deref()
    }

    #[must_use]
    pub fn measurement_type(&self) -> Option<&str> {
        self.measurement_type.as_deref()
    }

    #[must_use]
    pub const fn status(&self) -> PhotoStatus {
        self.status
    }

    /// Set iff the status is [`PhotoStatus::Failed`].
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `pending -> processing`.
    ///
    /// # Errors
    ///
    /// Returns the current status, unchanged, if the photo is not pending.
    pub fn begin_processing(&mut self) -> Result<(), PhotoStatus> {
        self.transition(PhotoStatus::Pending, PhotoStatus::Processing)
    }

    /// `processing -> completed`.
    ///
    /// # Errors
    ///
    /// Returns the current status, unchanged, if the photo is not processing.
    pub fn complete(&mut self) -> Result<(), PhotoStatus> {
        self.transition(PhotoStatus::Processing, PhotoStatus::Completed)
    }

    /// `processing -> failed` with a reason. An empty reason is replaced
    /// so a failed photo always explains itself.
    ///
    /// # Errors
    ///
    /// Returns the current status, unchanged, if the photo is not processing.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), PhotoStatus> {
        self.transition(PhotoStatus::Processing, PhotoStatus::Failed)?;
        let reason = reason.into();
        self.error_message = Some(if reason.trim().is_empty() {
            "processing failed for an unknown reason".to_owned()
        } else {
            reason
        });
        Ok(())
    }

    /// Record the reference type an auto-detected run settled on.
    /// Declared types are never overwritten.
    pub fn record_detected_reference(&mut self, reference_type: &str) {
        if self.reference_object.is_none() {
            self.reference_object = Some(reference_type.to_owned());
        }
    }

    fn transition(&mut self, from: PhotoStatus, to: PhotoStatus) -> Result<(), PhotoStatus> {
        if self.status != from {
            return Err(self.status);
        }
        self.status = to;
        Ok(())
    }
}

/// A persisted measurement, created together with the `completed`
/// transition of its photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    pub photo_id: PhotoId,
    /// Longer side, in the reference's units.
    pub length: f64,
    /// Shorter side, in the reference's units.
    pub width: f64,
    /// `length * width`.
    pub area: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl Measurement {
    /// Record `dimensions` for `photo_id`.
    #[must_use]
    pub fn new(photo_id: PhotoId, dimensions: &ObjectDimensions) -> Self {
        Self {
            id: Uuid::new_v4(),
            photo_id,
            length: dimensions.length,
            width: dimensions.width,
            area: dimensions.area,
            confidence: dimensions.confidence,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> NewPhoto {
        NewPhoto {
            storage_location: "photo.png".to_owned(),
            ..NewPhoto::default()
        }
    }

    #[test]
    fn new_photo_is_pending_without_error() {
        let photo = Photo::new(upload());
        assert_eq!(photo.status(), PhotoStatus::Pending);
        assert!(photo.error_message().is_none());
    }

    #[test]
    fn happy_path_transitions() {
        let mut photo = Photo::new(upload());
        assert_eq!(photo.begin_processing(), Ok(()));
        assert_eq!(photo.complete(), Ok(()));
        assert_eq!(photo.status(), PhotoStatus::Completed);
        assert!(photo.error_message().is_none());
    }

    #[test]
    fn failing_sets_message() {
        let mut photo = Photo::new(upload());
        photo.begin_processing().ok();
        assert_eq!(photo.fail("contour extraction failed: nothing"), Ok(()));
        assert_eq!(photo.status(), PhotoStatus::Failed);
        assert_eq!(
            photo.error_message(),
            Some("contour extraction failed: nothing")
        );
    }

    #[test]
    fn empty_failure_reason_is_replaced() {
        let mut photo = Photo::new(upload());
        photo.begin_processing().ok();
        photo.fail("  ").ok();
        assert!(photo.error_message().is_some_and(|m| !m.trim().is_empty()));
    }

    #[test]
    fn terminal_states_are_never_left() {
        let mut photo = Photo::new(upload());
        photo.begin_processing().ok();
        photo.complete().ok();
        assert_eq!(photo.begin_processing(), Err(PhotoStatus::Completed));
        assert_eq!(photo.fail("late"), Err(PhotoStatus::Completed));
        assert_eq!(photo.status(), PhotoStatus::Completed);
        assert!(photo.error_message().is_none());
    }

    #[test]
    fn pending_photo_cannot_complete() {
        let mut photo = Photo::new(upload());
        assert_eq!(photo.complete(), Err(PhotoStatus::Pending));
        assert_eq!(photo.fail("x"), Err(PhotoStatus::Pending));
        assert_eq!(photo.status(), PhotoStatus::Pending);
    }

    #[test]
    fn detected_reference_does_not_override_declared() {
        let mut declared = Photo::new(NewPhoto {
            reference_object: Some("ruler".to_owned()),
            ..upload()
        });
        declared.record_detected_reference("credit_card");
        assert_eq!(declared.reference_object(), Some("ruler"));

        let mut auto = Photo::new(upload());
        auto.record_detected_reference("credit_card");
        assert_eq!(auto.reference_object(), Some("credit_card"));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&PhotoStatus::Processing).ok();
        assert_eq!(json.as_deref(), Some("\"processing\""));
        assert_eq!(PhotoStatus::Failed.to_string(), "failed");
    }
}
