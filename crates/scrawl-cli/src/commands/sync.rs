use scrawl_core::sync::SyncReport;
use scrawl_core::NoteService;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, resolve_note_id, CliContext, ConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(context: &CliContext) -> Result<(), CliError> {
    let (_, engine) = context.open_sync()?;
    let report = engine.sync_once().await?;

    for line in format_sync_report(&report) {
        println!("{line}");
    }
    if !report.is_complete() {
        return Err(CliError::SyncIncomplete(report.drain.failures.len()));
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(pull) = &report.pull {
        lines.push(format!(
            "Pulled: {} applied, {} removed, {} deferred (checkpoint {})",
            pull.applied, pull.purged, pull.deferred, pull.checkpoint
        ));
    }
    lines.push(format!(
        "Pushed: {} acknowledged, {} conflicts, {} re-queued",
        report.drain.acked, report.drain.conflicts, report.drain.requeued
    ));
    lines.extend(
        report
            .drain
            .failures
            .iter()
            .map(|failure| format!("Still pending: {failure}")),
    );
    if report.drain.conflicts > 0 {
        lines.push("Run `scrawl sync conflicts` to review the losing copies.".to_string());
    }
    lines
}

pub fn run_sync_conflicts(as_json: bool, notes: &NoteService) -> Result<(), CliError> {
    let shadows = notes.conflicts(None)?;

    if as_json {
        let json_items = shadows
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if shadows.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&shadows) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_sync_resolve(id: &str, notes: &NoteService) -> Result<(), CliError> {
    let note_id = resolve_note_id(notes, id)?;

    match notes.acknowledge_conflict(&note_id)? {
        Some(note) => println!("{} {}", note.id, note.sync_state),
        None => println!("{note_id} removed"),
    }
    Ok(())
}
