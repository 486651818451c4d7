use scrawl_core::models::{Attachment, AttachmentKind};
use scrawl_core::NoteService;

use crate::cli::AttachmentKindArg;
use crate::commands::common::resolve_note_id;
use crate::error::CliError;

impl From<AttachmentKindArg> for AttachmentKind {
    fn from(value: AttachmentKindArg) -> Self {
        match value {
            AttachmentKindArg::Image => Self::Image,
            AttachmentKindArg::Audio => Self::Audio,
        }
    }
}

pub fn run_attach(
    id: &str,
    kind: Option<AttachmentKindArg>,
    url: Option<&str>,
    clear: bool,
    notes: &NoteService,
) -> Result<(), CliError> {
    let note_id = resolve_note_id(notes, id)?;

    let attachment = if clear {
        None
    } else {
        let (Some(kind), Some(url)) = (kind, url) else {
            return Err(CliError::Config(
                "attach requires --kind and --url, or --clear".to_string(),
            ));
        };
        Some(Attachment::new(kind.into(), url)?)
    };

    let note = notes.set_attachment(&note_id, attachment)?;
    match &note.attachment {
        Some(attachment) => println!("{} {} {}", note.id, attachment.kind, attachment.url),
        None => println!("{}", note.id),
    }
    Ok(())
}
