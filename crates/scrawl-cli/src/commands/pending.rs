use scrawl_core::NoteService;

use crate::commands::common::{format_pending_lines, pending_to_item, PendingItem};
use crate::error::CliError;

pub fn run_pending(as_json: bool, notes: &NoteService) -> Result<(), CliError> {
    let ops = notes.pending_operations()?;

    if as_json {
        let json_items = ops.iter().map(pending_to_item).collect::<Vec<PendingItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if ops.is_empty() {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    for line in format_pending_lines(&ops) {
        println!("{line}");
    }
    Ok(())
}
