//! Configuration file handling for the CLI.
//!
//! A configuration file has two tables, `[pipeline]` and `[llm]`. Every key
//! is optional; command-line flags and `FORGE_LLM_*` environment variables
//! take precedence over the file.

use crate::cli::{Preset, RunArgs};
use crate::error::{CliError, Result};
use forge_engine::PipelineConfig;
use forge_llm::LlmConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete configuration of a `forge run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Engine settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Provider settings
    #[serde(default)]
    pub llm: LlmConfig,
}

impl ForgeConfig {
    /// Configuration with the given pipeline preset.
    pub fn preset(preset: Preset) -> Self {
        let pipeline = match preset {
            Preset::Default => PipelineConfig::default(),
            Preset::Conservative => PipelineConfig::conservative(),
            Preset::Aggressive => PipelineConfig::aggressive(),
        };
        Self {
            pipeline,
            llm: LlmConfig::default(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Render as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Resolve the configuration for a run: preset, then file, then flags.
    ///
    /// When both a preset and a file are given, the file's `[pipeline]`
    /// table is layered over the preset key by key.
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let mut config = match (&args.config, args.preset) {
            (Some(path), Some(preset)) => {
                let contents = fs::read_to_string(path).map_err(|e| {
                    CliError::Config(format!("Cannot read {}: {}", path.display(), e))
                })?;
                Self::layered(Self::preset(preset), &contents)?
            }
            (Some(path), None) => Self::load(path)?,
            (None, Some(preset)) => Self::preset(preset),
            (None, None) => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, args: &RunArgs) {
        let p = &mut self.pipeline;
        if let Some(input) = &args.input {
            p.input = input.clone();
        }
        if let Some(output) = &args.output {
            p.output = output.clone();
        }
        if let Some(error_log) = &args.error_log {
            p.error_log = error_log.clone();
        }
        if let Some(checkpoint) = &args.checkpoint {
            p.checkpoint = checkpoint.clone();
        }
        if let Some(workers) = args.max_workers {
            p.max_workers = workers;
        }
        if let Some(rate) = args.rate_limit {
            p.rate_limit = rate;
        }
        if args.burst.is_some() {
            p.burst = args.burst;
        }
        if let Some(interval) = args.checkpoint_interval {
            p.checkpoint_interval = interval;
        }
        if let Some(attempts) = args.max_attempts {
            p.max_attempts = attempts;
        }
        if args.resume {
            p.resume = true;
        }
        if args.clear_checkpoint {
            p.clear_checkpoint = true;
        }
        if args.id_field.is_some() {
            p.id_field = args.id_field.clone();
        }

        let llm = &mut self.llm;
        if args.api_key.is_some() {
            llm.api_key = args.api_key.clone();
        }
        if let Some(base_url) = &args.base_url {
            llm.base_url = base_url.clone();
        }
        if let Some(model) = &args.model {
            llm.model = model.clone();
        }
    }

    /// Validate both tables.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate().map_err(CliError::Config)?;
        self.llm.validate().map_err(CliError::Config)?;
        Ok(())
    }

    /// Merge a TOML document over a base configuration.
    fn layered(base: Self, contents: &str) -> Result<Self> {
        let mut merged = toml::Value::try_from(&base)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))?;
        let overlay: toml::Value = toml::from_str(contents)?;
        merge(&mut merged, overlay);
        Ok(merged.try_into()?)
    }
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
