use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::Config;
use crate::services::CalibrationConfig;

/// Shared application state
///
/// Calibration runs carry all of their data in the request, so the state is
/// only the service configuration.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Component config used when a request does not send one
    pub fn default_calibration_config(&self) -> CalibrationConfig {
        CalibrationConfig {
            list_size: self.config.default_list_size,
            ..CalibrationConfig::default()
        }
    }

    /// Deadline of a run starting now, if one is configured
    pub fn run_deadline(&self) -> Option<Instant> {
        self.config
            .run_deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms))
    }
}
