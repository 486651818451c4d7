use scrawl_core::NoteService;

use crate::commands::common::{format_note_detail, note_to_list_item, resolve_note};
use crate::error::CliError;

pub fn run_show(id: &str, as_json: bool, notes: &NoteService) -> Result<(), CliError> {
    let note = resolve_note(notes, id)?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&note_to_list_item(&note))?
        );
    } else {
        for line in format_note_detail(&note) {
            println!("{line}");
        }
    }
    Ok(())
}
