//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Forge - Resumable batch transformation of JSON-lines records.
#[derive(Debug, Parser)]
#[command(name = "forge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true, default_value = "text")]
    pub format: CliFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliFormat {
    /// Human-readable text (default)
    Text,
    /// JSON format
    Json,
}

/// Configuration preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Balanced defaults
    Default,
    /// Few workers and a low rate, for tight provider limits
    Conservative,
    /// Many workers and a high rate, for generous quotas
    Aggressive,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process an input file
    Run(RunArgs),

    /// Show checkpoint progress
    Status(StatusArgs),

    /// Delete a checkpoint
    Clear(ClearArgs),

    /// Write a configuration file with default settings
    InitConfig(InitConfigArgs),
}

/// Arguments for the run command.
#[derive(Debug, Default, Parser)]
pub struct RunArgs {
    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Start from a preset instead of the defaults (file values still apply)
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// JSON-lines input file
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file for successful records
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Error log for failed records
    #[arg(long)]
    pub error_log: Option<PathBuf>,

    /// Checkpoint file
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Maximum concurrent workers
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Maximum requests per second
    #[arg(short, long)]
    pub rate_limit: Option<f64>,

    /// Burst size of the rate limiter
    #[arg(long)]
    pub burst: Option<u32>,

    /// Save a checkpoint every N processed records
    #[arg(long)]
    pub checkpoint_interval: Option<u64>,

    /// Attempts per record, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Continue from the existing checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Delete the checkpoint and start over (overrides --resume)
    #[arg(long)]
    pub clear_checkpoint: bool,

    /// Record field holding the task id (default: line number)
    #[arg(long)]
    pub id_field: Option<String>,

    /// File containing the system prompt sent with every record
    #[arg(long)]
    pub system_prompt_file: Option<PathBuf>,

    /// API key for the completion endpoint
    #[arg(long, env = "FORGE_LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "FORGE_LLM_BASE_URL")]
    pub base_url: Option<String>,

    /// Model identifier
    #[arg(short, long, env = "FORGE_LLM_MODEL")]
    pub model: Option<String>,
}

/// Arguments for the status command.
#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Checkpoint file
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Input file, to report how many records remain
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Record field holding the task id (default: line number)
    #[arg(long)]
    pub id_field: Option<String>,
}

/// Arguments for the clear command.
#[derive(Debug, Parser)]
pub struct ClearArgs {
    /// Checkpoint file
    #[arg(long)]
    pub checkpoint: PathBuf,
}

/// Arguments for the init-config command.
#[derive(Debug, Parser)]
pub struct InitConfigArgs {
    /// Where to write the file
    #[arg(default_value = "forge.toml")]
    pub path: PathBuf,

    /// Preset to write
    #[arg(long, value_enum, default_value = "default")]
    pub preset: Preset,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "forge",
            "run",
            "--input",
            "in.jsonl",
            "-w",
            "4",
            "--rate-limit",
            "2.5",
            "--resume",
            "--id-field",
            "doc_id",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.input, Some(PathBuf::from("in.jsonl")));
        assert_eq!(args.max_workers, Some(4));
        assert_eq!(args.rate_limit, Some(2.5));
        assert!(args.resume);
        assert!(!args.clear_checkpoint);
        assert_eq!(args.id_field.as_deref(), Some("doc_id"));
        assert_eq!(cli.format, CliFormat::Text);
    }

    #[test]
    fn test_parse_status_requires_checkpoint() {
        assert!(Cli::try_parse_from(["forge", "status"]).is_err());

        let cli =
            Cli::try_parse_from(["forge", "status", "--checkpoint", "cp.json", "--format", "json"])
                .unwrap();
        assert_eq!(cli.format, CliFormat::Json);
        assert!(matches!(cli.command, Command::Status(_)));
    }

    #[test]
    fn test_parse_init_config_defaults() {
        let cli = Cli::try_parse_from(["forge", "init-config"]).unwrap();
        let Command::InitConfig(args) = cli.command else {
            panic!("expected init-config command");
        };
        assert_eq!(args.path, PathBuf::from("forge.toml"));
        assert_eq!(args.preset, Preset::Default);
        assert!(!args.force);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["forge", "clear", "--checkpoint", "cp.json", "-v", "--no-color"])
            .unwrap();
        assert!(cli.verbose);
        assert!(cli.no_color);
    }
}
