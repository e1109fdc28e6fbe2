//! Poll tuning knobs, loadable from TOML.
//!
//! Every field has a default, so an empty (or absent) config file yields a
//! working configuration and a partial file overrides only what it names.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors while loading tuning from disk.
#[derive(Debug, Error)]
pub enum TuningError {
    /// The file could not be read.
    #[error("failed to read tuning file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("failed to parse tuning file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunable parameters of the polling engine.
#[derive(Debug, Clone, Deserialize)]
pub struct PollTuning {
    /// Delay between polls when everything is healthy.
    #[serde(default = "default_min_poll_interval_ms")]
    pub min_poll_interval_ms: u64,

    /// Base increment added per consecutive failure.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Multiplier applied to the per-failure increment.
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,

    /// Hard cap on the backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive successful polls against one node before a forced
    /// rotation.
    #[serde(default = "default_max_node_poll_count")]
    pub max_node_poll_count: u32,

    /// Total response byte budget per poll, split across namespaces by
    /// priority.
    #[serde(default = "default_response_budget_bytes")]
    pub response_budget_bytes: usize,
}

fn default_min_poll_interval_ms() -> u64 {
    3_000
}

fn default_retry_interval_ms() -> u64 {
    2_000
}

fn default_growth_factor() -> f64 {
    1.2
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_node_poll_count() -> u32 {
    16
}

fn default_response_budget_bytes() -> usize {
    512 * 1024
}

impl Default for PollTuning {
    fn default() -> Self {
        Self {
            min_poll_interval_ms: default_min_poll_interval_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            growth_factor: default_growth_factor(),
            max_delay_ms: default_max_delay_ms(),
            max_node_poll_count: default_max_node_poll_count(),
            response_budget_bytes: default_response_budget_bytes(),
        }
    }
}

impl PollTuning {
    /// Parse tuning from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, TuningError> {
        Ok(toml::from_str(s)?)
    }

    /// Load tuning from a TOML file.
    pub fn load(path: &Path) -> Result<Self, TuningError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// The delay before the next poll cycle, as a pure function of the
    /// consecutive failure count.
    ///
    /// Zero failures polls at the minimum interval; each failure adds
    /// `retry_interval_ms * failures * growth_factor` on top, capped at
    /// `max_delay_ms`.
    pub fn next_poll_delay(&self, failure_count: u32) -> Duration {
        if failure_count == 0 {
            return Duration::from_millis(self.min_poll_interval_ms);
        }
        let extra =
            (self.retry_interval_ms as f64) * f64::from(failure_count) * self.growth_factor;
        let delay_ms = (self.min_poll_interval_ms as f64 + extra) as u64;
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_failures_polls_at_minimum_interval() {
        let tuning = PollTuning {
            min_poll_interval_ms: 3_000,
            ..Default::default()
        };
        assert_eq!(tuning.next_poll_delay(0), Duration::from_secs(3));
    }

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let tuning = PollTuning::default();
        let mut previous = tuning.next_poll_delay(0);
        for failures in 1..200 {
            let delay = tuning.next_poll_delay(failures);
            assert!(delay >= previous, "delay shrank at {failures} failures");
            assert!(delay <= Duration::from_millis(tuning.max_delay_ms));
            previous = delay;
        }
        assert_eq!(
            tuning.next_poll_delay(10_000),
            Duration::from_millis(tuning.max_delay_ms)
        );
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let tuning = PollTuning::from_toml_str("").unwrap();
        assert_eq!(tuning.min_poll_interval_ms, 3_000);
        assert_eq!(tuning.max_node_poll_count, 16);
    }

    #[test]
    fn partial_toml_overrides_named_fields_only() {
        let tuning = PollTuning::from_toml_str(
            "min_poll_interval_ms = 500\nmax_node_poll_count = 4\n",
        )
        .unwrap();
        assert_eq!(tuning.min_poll_interval_ms, 500);
        assert_eq!(tuning.max_node_poll_count, 4);
        assert_eq!(tuning.max_delay_ms, 60_000);
    }

    #[test]
    fn garbage_toml_is_a_parse_error() {
        assert!(matches!(
            PollTuning::from_toml_str("min_poll_interval_ms = \"soon\""),
            Err(TuningError::Parse(_))
        ));
    }
}
