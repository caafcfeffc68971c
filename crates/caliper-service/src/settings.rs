//! Service settings, loaded once at startup.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML or JSON file
//! 3. `CALIPER__SECTION__KEY` environment variables, e.g.
//!    `CALIPER__RUNNER__MAX_CONCURRENT_RUNS=8`

use std::path::Path;
use std::time::Duration;

use caliper_pipeline::{PipelineConfig, ReferenceCatalog};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::NewPhoto;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CALIPER";

/// Everything the service needs, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Reference types in detection order.
    pub references: ReferenceCatalog,
    pub pipeline: PipelineConfig,
    pub runner: RunnerSettings,
    pub intake: IntakeSettings,
}

/// Work queue limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Runs executing at once; further runs wait for a slot.
    pub max_concurrent_runs: usize,
    /// Wall-clock budget of one run, not counting time spent waiting for
    /// a slot.
    pub run_timeout_secs: u64,
}

impl RunnerSettings {
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            run_timeout_secs: 60,
        }
    }
}

/// Upload checks applied by `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    /// Accepted file extensions, lowercase, without the dot.
    pub supported_formats: Vec<String>,
    /// Largest accepted upload in bytes.
    pub max_file_size: u64,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            supported_formats: ["jpg", "jpeg", "png", "bmp"].map(str::to_owned).to_vec(),
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl IntakeSettings {
    /// Check an upload's extension and declared size.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidUpload`] describing the problem.
    pub fn check(&self, upload: &NewPhoto) -> Result<(), ServiceError> {
        let extension = Path::new(&upload.storage_location)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.supported_formats.iter().any(|f| *f == extension) {
            return Err(ServiceError::InvalidUpload(format!(
                "unsupported format '{extension}' for '{}'; expected one of: {}",
                upload.storage_location,
                self.supported_formats.join(", ")
            )));
        }
        if let Some(size) = upload.size_bytes
            && size > self.max_file_size
        {
            return Err(ServiceError::InvalidUpload(format!(
                "{size} bytes exceeds the {} byte limit",
                self.max_file_size
            )));
        }
        Ok(())
    }
}

impl Settings {
    /// Load defaults, then `file` if given, then the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Settings`] if a source cannot be read or
    /// parsed, or the result fails [`validate`](Self::validate).
    pub fn load(file: Option<&Path>) -> Result<Self, ServiceError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Settings`] naming the first problem.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.references.is_empty() {
            return Err(invalid("at least one reference object must be configured"));
        }
        if self.runner.max_concurrent_runs == 0 {
            return Err(invalid("runner.max_concurrent_runs must be at least 1"));
        }
        if self.runner.run_timeout_secs == 0 {
            return Err(invalid("runner.run_timeout_secs must be at least 1"));
        }
        if self.intake.supported_formats.is_empty() {
            return Err(invalid("intake.supported_formats must not be empty"));
        }
        self.pipeline
            .validate()
            .map_err(|err| invalid(err.to_string()))
    }
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::Settings(ConfigError::Message(message.into()))
}
