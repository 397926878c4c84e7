//! Clear command implementation.

use crate::cli::ClearArgs;
use crate::error::Result;
use crate::output::Formatter;
use forge_engine::CheckpointStore;

/// Execute the clear command.
pub async fn execute_clear(args: ClearArgs, formatter: &Formatter) -> Result<()> {
    if CheckpointStore::remove(&args.checkpoint)? {
        println!(
            "{}",
            formatter.success(&format!("Removed checkpoint {}", args.checkpoint.display()))
        );
    } else {
        println!(
            "{}",
            formatter.info(&format!("No checkpoint at {}", args.checkpoint.display()))
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliFormat;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("cp.json");
        std::fs::write(&checkpoint, "{}").unwrap();
        let formatter = Formatter::new(CliFormat::Text, false);

        execute_clear(ClearArgs { checkpoint: checkpoint.clone() }, &formatter)
            .await
            .unwrap();
        assert!(!checkpoint.exists());

        execute_clear(ClearArgs { checkpoint }, &formatter).await.unwrap();
    }
}
