//! Run command implementation.

use crate::cli::RunArgs;
use crate::config::ForgeConfig;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use forge_engine::{PipelineRunner, RunReport};
use forge_llm::{LlmTransformer, OpenAiProvider};
use std::fs;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Execute the run command.
pub async fn execute_run(args: RunArgs, formatter: &Formatter) -> Result<()> {
    let mut config = ForgeConfig::resolve(&args)?;

    if let Some(path) = &args.system_prompt_file {
        let prompt = fs::read_to_string(path).map_err(|e| {
            CliError::InvalidInput(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if prompt.trim().is_empty() {
            return Err(CliError::InvalidInput(format!(
                "System prompt file {} is empty",
                path.display()
            )));
        }
        config.llm.system_prompt = prompt;
    }

    if config.llm.api_key.is_none() {
        warn!("No API key configured (set FORGE_LLM_API_KEY or pass --api-key)");
    }

    let provider = OpenAiProvider::new(&config.llm)?;
    info!(
        endpoint = provider.endpoint(),
        model = %config.llm.model,
        "Using completion endpoint"
    );
    let transformer = Arc::new(LlmTransformer::new(provider, config.llm.system_prompt.clone()));

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());

    let runner = PipelineRunner::new(config.pipeline, transformer);
    let result = runner.run(cancel).await;
    interrupt.abort();

    let report = result?;
    print_report(&report, formatter)
}

/// Cancel the run on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, draining in-flight records");
            cancel.cancel();
        }
    })
}

fn print_report(report: &RunReport, formatter: &Formatter) -> Result<()> {
    println!("{}", formatter.format_report(report)?);

    if report.interrupted {
        eprintln!(
            "{}",
            formatter.warning("Run interrupted; rerun with --resume to continue")
        );
    } else if report.failed > 0 {
        eprintln!(
            "{}",
            formatter.error(&format!(
                "{} record(s) failed; see {}",
                report.failed,
                report.error_log.display()
            ))
        );
    } else {
        eprintln!("{}", formatter.success("All records processed"));
    }
    Ok(())
}
