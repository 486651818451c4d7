use scrawl_core::NoteService;

use crate::commands::common::resolve_note_id;
use crate::error::CliError;

pub fn run_delete(id: &str, notes: &NoteService) -> Result<(), CliError> {
    let note_id = resolve_note_id(notes, id)?;

    notes.delete_note(&note_id)?;
    println!("{note_id}");
    Ok(())
}
