//! caliper-service: Photo lifecycle around the measurement pipeline.
//!
//! A photo is submitted, claimed for processing, measured on a bounded
//! work queue and ends `completed` with a measurement or `failed` with a
//! message naming the failing stage. Storage, image bytes and
//! notifications sit behind traits; in-process implementations of each
//! are provided.

pub mod error;
pub mod images;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod runner;
pub mod settings;
pub mod store;

pub use error::{ServiceError, StageFailure};
pub use images::{FsImageSource, ImageSource, ImageSourceError, MemoryImageSource};
pub use model::{Measurement, NewPhoto, Photo, PhotoId, PhotoStatus};
pub use notify::{BroadcastNotifier, Notifier, PhotoEvent};
pub use orchestrator::{Orchestrator, RunHandle};
pub use runner::{MeasureService, RunRequest, Runner};
pub use settings::{IntakeSettings, RunnerSettings, Settings};
pub use store::{Claim, MemoryStore, PhotoStore, StoreError};
