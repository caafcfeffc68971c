#![allow(dead_code, unused_imports, clippy::expect_used)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from caliper_service for tests
pub use caliper_service::{
    BroadcastNotifier, Claim, ImageSource, ImageSourceError, Measurement, MemoryImageSource,
    MemoryStore, NewPhoto, Notifier, Orchestrator, Photo, PhotoEvent, PhotoId, PhotoStatus,
    PhotoStore, ServiceError, Settings, StoreError,
};
