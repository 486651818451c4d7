use scrawl_core::{Note, NoteService};

use crate::commands::common::{capture_editor_input_with_initial, resolve_note};
use crate::error::CliError;

/// Replace the given fields, or open the editor on the body when none is given.
pub fn run_edit(
    id: &str,
    title: Option<String>,
    body: Option<String>,
    notes: &NoteService,
) -> Result<(), CliError> {
    let note = resolve_note(notes, id)?;

    let (title, body) = if title.is_none() && body.is_none() {
        let Some(edited_body) = capture_editor_input_with_initial(&note.body)? else {
            return Err(CliError::EmptyEditedContent);
        };
        (note.title.clone(), edited_body)
    } else {
        (
            title.map_or_else(|| note.title.clone(), |value| value.trim().to_string()),
            body.unwrap_or_else(|| note.body.clone()),
        )
    };

    let updated = apply_edit(&note, &title, &body, notes)?;
    println!("{}", updated.id);
    Ok(())
}

/// Unchanged content leaves the note and its sync queue untouched.
pub fn apply_edit(
    note: &Note,
    title: &str,
    body: &str,
    notes: &NoteService,
) -> Result<Note, CliError> {
    if title == note.title && body == note.body {
        return Ok(note.clone());
    }
    if title.trim().is_empty() && body.trim().is_empty() {
        return Err(CliError::EmptyEditedContent);
    }
    Ok(notes.update_note(&note.id, title, body)?)
}
