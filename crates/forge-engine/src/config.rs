//! Configuration for pipeline runs
//!
//! Defines file locations, concurrency and rate bounds, the retry schedule
//! and the checkpoint cadence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one pipeline run
///
/// # Examples
///
/// ```
/// use forge_engine::PipelineConfig;
///
/// // Default configuration (balanced)
/// let config = PipelineConfig::default();
/// assert_eq!(config.max_workers, 10);
///
/// // Free-tier providers with tight short-window limits
/// let config = PipelineConfig::conservative();
/// assert_eq!(config.max_workers, 2);
///
/// // High-quota providers
/// let config = PipelineConfig::aggressive();
/// assert_eq!(config.max_workers, 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// JSON-lines input, one record per line
    #[serde(default = "default_input")]
    pub input: PathBuf,

    /// JSON-lines output of successful transformations
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// JSON-lines log of failed tasks
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,

    /// Checkpoint snapshot location
    #[serde(default = "default_checkpoint")]
    pub checkpoint: PathBuf,

    /// Number of tasks processed concurrently
    /// Default: 10
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Outbound requests per second across all workers
    /// Default: 10.0
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    /// Token bucket capacity; defaults to the rate rounded up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,

    /// Flush the checkpoint every N completed tasks
    /// Default: 100
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Attempts per task before giving up (including the first)
    /// Default: 5
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay (milliseconds), doubled on every retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random jitter added to each delay, as a fraction of it
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    /// Timeout for one external call (seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Continue from an existing checkpoint instead of starting fresh
    #[serde(default)]
    pub resume: bool,

    /// Delete any existing checkpoint and start every record over
    ///
    /// Takes precedence over `resume`: the result files are truncated too.
    #[serde(default)]
    pub clear_checkpoint: bool,

    /// Record field holding the task id; line numbers are used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
}

fn default_input() -> PathBuf {
    PathBuf::from("input.jsonl")
}

fn default_output() -> PathBuf {
    PathBuf::from("output.jsonl")
}

fn default_error_log() -> PathBuf {
    PathBuf::from("errors.jsonl")
}

fn default_checkpoint() -> PathBuf {
    PathBuf::from("checkpoints/checkpoint.json")
}

fn default_max_workers() -> usize {
    10
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_checkpoint_interval() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_fraction() -> f64 {
    0.1
}

fn default_call_timeout_secs() -> u64 {
    120
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            error_log: default_error_log(),
            checkpoint: default_checkpoint(),
            max_workers: default_max_workers(),
            rate_limit: default_rate_limit(),
            burst: None,
            checkpoint_interval: default_checkpoint_interval(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_fraction: default_jitter_fraction(),
            call_timeout_secs: default_call_timeout_secs(),
            resume: false,
            clear_checkpoint: false,
            id_field: None,
        }
    }
}

impl PipelineConfig {
    /// Conservative preset for providers with strict short-window limits
    ///
    /// - 2 workers, 1 request/second, no burst
    /// - Longer backoff (2s base, 120s ceiling)
    /// - Checkpoint every 25 tasks
    pub fn conservative() -> Self {
        Self {
            max_workers: 2,
            rate_limit: 1.0,
            burst: Some(1),
            checkpoint_interval: 25,
            base_delay_ms: 2_000,
            max_delay_ms: 120_000,
            ..Self::default()
        }
    }

    /// Aggressive preset for high-quota providers
    ///
    /// - 50 workers, 50 requests/second
    /// - Short backoff (500ms base, 30s ceiling)
    /// - Checkpoint every 500 tasks
    pub fn aggressive() -> Self {
        Self {
            max_workers: 50,
            rate_limit: 50.0,
            checkpoint_interval: 500,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            ..Self::default()
        }
    }

    /// Token bucket capacity actually used
    pub fn bucket_capacity(&self) -> u32 {
        self.burst
            .unwrap_or_else(|| self.rate_limit.ceil().max(1.0) as u32)
    }

    /// First backoff delay as a Duration
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff ceiling as a Duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Per-call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".to_string());
        }
        if !self.rate_limit.is_finite() || self.rate_limit <= 0.0 {
            return Err("rate_limit must be a positive number".to_string());
        }
        if self.burst == Some(0) {
            return Err("burst must be at least 1".to_string());
        }
        if self.checkpoint_interval == 0 {
            return Err("checkpoint_interval must be greater than 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err("base_delay_ms cannot exceed max_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err("jitter_fraction must be within [0, 1]".to_string());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be greater than 0".to_string());
        }
        if self.id_field.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err("id_field must not be empty".to_string());
        }
        for (name, path) in [
            ("output", &self.output),
            ("error_log", &self.error_log),
            ("checkpoint", &self.checkpoint),
        ] {
            if path == &self.input {
                return Err(format!("{} must not point at the input file", name));
            }
        }
        if self.output == self.error_log {
            return Err("output and error_log must be different files".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.checkpoint_interval, 100);
        assert!(!config.resume);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(PipelineConfig::conservative().validate().is_ok());
        assert!(PipelineConfig::aggressive().validate().is_ok());
        assert!(PipelineConfig::conservative().rate_limit < PipelineConfig::default().rate_limit);
        assert!(PipelineConfig::aggressive().max_workers > PipelineConfig::default().max_workers);
    }

    #[test]
    fn test_bucket_capacity() {
        let mut config = PipelineConfig::default();
        config.rate_limit = 2.5;
        assert_eq!(config.bucket_capacity(), 3);

        config.rate_limit = 0.2;
        assert_eq!(config.bucket_capacity(), 1);

        config.burst = Some(7);
        assert_eq!(config.bucket_capacity(), 7);
    }

    fn assert_invalid(mutate: impl Fn(&mut PipelineConfig)) {
        let mut config = PipelineConfig::default();
        mutate(&mut config);
        assert!(config.validate().is_err(), "expected invalid: {:?}", config);
    }

    #[test]
    fn test_invalid_bounds() {
        assert_invalid(|c| c.max_workers = 0);
        assert_invalid(|c| c.rate_limit = 0.0);
        assert_invalid(|c| c.rate_limit = f64::NAN);
        assert_invalid(|c| c.burst = Some(0));
        assert_invalid(|c| c.checkpoint_interval = 0);
        assert_invalid(|c| c.max_attempts = 0);
        assert_invalid(|c| c.base_delay_ms = c.max_delay_ms + 1);
        assert_invalid(|c| c.jitter_fraction = 1.5);
        assert_invalid(|c| c.call_timeout_secs = 0);
        assert_invalid(|c| c.output = c.input.clone());
        assert_invalid(|c| c.error_log = c.output.clone());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            input = "data/pairs.jsonl"
            max_workers = 4
            rate_limit = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.input, PathBuf::from("data/pairs.jsonl"));
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.checkpoint_interval, 100);
        assert_eq!(config.base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::conservative();
        let toml_str = config.to_toml().unwrap();
        let parsed = PipelineConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.max_workers, parsed.max_workers);
        assert_eq!(config.burst, parsed.burst);
        assert_eq!(config.max_delay_ms, parsed.max_delay_ms);
    }
}
