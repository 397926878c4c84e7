//! Status command implementation.

use crate::cli::StatusArgs;
use crate::error::Result;
use crate::output::{Formatter, StatusView};
use forge_engine::{count_pending, CheckpointStore, IdStrategy};
use std::collections::BTreeSet;

/// Execute the status command.
pub async fn execute_status(args: StatusArgs, formatter: &Formatter) -> Result<()> {
    println!("{}", render_status(&args, formatter)?);
    Ok(())
}

/// Build the status text for a checkpoint.
pub fn render_status(args: &StatusArgs, formatter: &Formatter) -> Result<String> {
    let exists = args.checkpoint.exists();
    let state = CheckpointStore::load(&args.checkpoint);

    let (total, remaining) = match &args.input {
        Some(input) => {
            let strategy = IdStrategy::from_field(args.id_field.as_deref());
            let total = count_pending(input, &strategy, &BTreeSet::new())?;
            let remaining = count_pending(input, &strategy, &state.completed_ids)?;
            (Some(total), Some(remaining))
        }
        None => (None, None),
    };

    formatter.format_status(&StatusView {
        path: &args.checkpoint,
        exists,
        state: &state,
        total,
        remaining,
    })
}
