//! Init-config command implementation.

use crate::cli::InitConfigArgs;
use crate::config::ForgeConfig;
use crate::error::{CliError, Result};
use crate::output::Formatter;

/// Execute the init-config command.
pub async fn execute_init_config(args: InitConfigArgs, formatter: &Formatter) -> Result<()> {
    if args.path.exists() && !args.force {
        return Err(CliError::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        )));
    }

    ForgeConfig::preset(args.preset).save(&args.path)?;
    println!(
        "{}",
        formatter.success(&format!("Wrote {}", args.path.display()))
    );
    Ok(())
}
