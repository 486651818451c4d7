use scrawl_core::NoteService;

use crate::commands::common::{
    format_note_lines, normalize_search_query, note_to_list_item, NoteListItem,
};
use crate::error::CliError;

pub fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    notes: &NoteService,
) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let found = notes.search_notes(&normalized_query, limit)?;

    if as_json {
        let json_items = found
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&found) {
            println!("{line}");
        }
    }

    Ok(())
}
