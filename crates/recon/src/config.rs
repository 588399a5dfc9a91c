use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// Options for one reconciliation run. Passed explicitly to the entry points.
///
/// Every field has a default, so an empty TOML table is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconOptions {
    /// Inclusive name-score threshold, 0–100.
    pub similarity_threshold: u8,
    pub enable_notifications: bool,
    /// Per-request timeout handed to the HTTP clients. The engine itself
    /// never times out a call.
    pub request_timeout_seconds: u64,
    pub dry_run: bool,
    pub max_parallel_groups: usize,
    pub retry: RetryPolicy,
}

impl Default for ReconOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: 85,
            enable_notifications: true,
            request_timeout_seconds: 30,
            dry_run: false,
            max_parallel_groups: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconOptions {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let options: ReconOptions =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.similarity_threshold > 100 {
            return Err(ReconError::InvalidOptions(format!(
                "similarity_threshold must be 0-100, got {}",
                self.similarity_threshold
            )));
        }
        if self.max_parallel_groups == 0 {
            return Err(ReconError::InvalidOptions(
                "max_parallel_groups must be at least 1".into(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ReconError::InvalidOptions(
                "request_timeout_seconds must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ReconError::InvalidOptions(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ReconError::InvalidOptions(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        Ok(())
    }
}
