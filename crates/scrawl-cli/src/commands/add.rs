use scrawl_core::{Note, NoteService};

use crate::commands::common::{normalize_content, resolve_note_body};
use crate::error::CliError;

pub fn run_add(
    title: Option<&str>,
    body_parts: &[String],
    notes: &NoteService,
) -> Result<(), CliError> {
    let title = title.and_then(normalize_content).unwrap_or_default();
    let body = resolve_note_body(body_parts, !title.is_empty())?;
    let note = add_note(&title, &body, notes)?;

    println!("{}", note.id);
    Ok(())
}

pub fn add_note(title: &str, body: &str, notes: &NoteService) -> Result<Note, CliError> {
    if title.trim().is_empty() && body.trim().is_empty() {
        return Err(CliError::EmptyContent);
    }
    Ok(notes.create_note(title, body)?)
}
