use scrawl_core::NoteService;

use crate::commands::common::{format_note_lines, list_notes, note_to_list_item, NoteListItem};
use crate::error::CliError;

pub fn run_list(limit: usize, as_json: bool, notes: &NoteService) -> Result<(), CliError> {
    let listed = list_notes(notes, limit)?;

    if as_json {
        let json_items = listed
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&listed) {
            println!("{line}");
        }
    }

    Ok(())
}
