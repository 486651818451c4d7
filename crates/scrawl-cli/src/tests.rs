use std::sync::Arc;

use pretty_assertions::assert_eq;
use scrawl_core::models::{AttachmentKind, SyncState};
use scrawl_core::sync::{DrainReport, PullReport, SyncReport};
use scrawl_core::{InMemoryRemote, NoteService, Session, SyncEngine, SyncPhase, SyncStatus};
use tempfile::TempDir;

use crate::cli::{AttachmentKindArg, CompletionShell};
use crate::commands::add::add_note;
use crate::commands::attach::run_attach;
use crate::commands::common::{
    default_editor, format_conflict_lines, format_note_lines, format_pending_lines,
    format_relative_time, list_notes, normalize_content, normalize_note_identifier,
    normalize_search_query, note_preview, note_to_list_item, resolve_note, CliContext,
};
use crate::commands::completions::render_completions;
use crate::commands::config::merge_profile;
use crate::commands::delete::run_delete;
use crate::commands::edit::apply_edit;
use crate::commands::sync::{format_sync_report, run_sync_resolve};
use crate::commands::watch::format_status_line;
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn local_context(dir: &TempDir) -> CliContext {
    CliContext::with_profile(
        dir.path().join("nested").join("scrawl.db"),
        "cli-tests",
        CliProfile {
            owner_id: Some("cli-user".to_string()),
            ..CliProfile::default()
        },
    )
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn normalize_identifiers_and_queries_reject_blank() {
    assert!(matches!(
        normalize_note_identifier("  "),
        Err(CliError::EmptyNoteId)
    ));
    assert!(matches!(
        normalize_search_query(""),
        Err(CliError::EmptySearchQuery)
    ));
    assert_eq!(normalize_search_query(" milk ").unwrap(), "milk");
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn note_preview_prefers_title_then_first_body_line() {
    let dir = TempDir::new().unwrap();
    let notes = local_context(&dir).open_notes().unwrap();

    let titled = add_note("Groceries", "milk\neggs", &notes).unwrap();
    let untitled = add_note("", "  first   line \nsecond", &notes).unwrap();
    let long = add_note(&"x".repeat(50), "", &notes).unwrap();

    assert_eq!(note_preview(&titled, 40), "Groceries");
    assert_eq!(note_preview(&untitled, 40), "first line");
    assert_eq!(note_preview(&long, 10), "xxxxxxx...");
}

#[test]
fn add_rejects_empty_note() {
    let dir = TempDir::new().unwrap();
    let notes = local_context(&dir).open_notes().unwrap();
    assert!(matches!(
        add_note(" ", "\n", &notes),
        Err(CliError::EmptyContent)
    ));
}

#[test]
fn add_creates_store_directory_and_lists_newest_first() {
    let dir = TempDir::new().unwrap();
    let context = local_context(&dir);
    let notes = context.open_notes().unwrap();

    let first = add_note("first", "", &notes).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = add_note("second", "", &notes).unwrap();
    assert!(context.db_path.exists());

    let listed = list_notes(&notes, 10).unwrap();
    let ids: Vec<_> = listed.iter().map(|note| note.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert_eq!(list_notes(&notes, 1).unwrap().len(), 1);

    let lines = format_note_lines(&listed);
    assert!(lines[0].contains("second"));
    assert!(lines[0].contains("(dirty)"));

    let item = note_to_list_item(&first);
    assert_eq!(item.title, "first");
    assert_eq!(item.sync_state, "dirty");
}

#[test]
fn notes_survive_reopening_the_store() {
    let dir = TempDir::new().unwrap();
    let context = local_context(&dir);
    let created = add_note("kept", "body", &context.open_notes().unwrap()).unwrap();

    let reopened = context.open_notes().unwrap();
    assert_eq!(reopened.get_note(&created.id).unwrap().body, "body");
}

#[test]
fn resolve_note_accepts_unique_prefix() {
    let dir = TempDir::new().unwrap();
    let notes = local_context(&dir).open_notes().unwrap();
    let note = add_note("prefix", "", &notes).unwrap();

    let full = note.id.to_string();
    let resolved = resolve_note(&notes, &full[..full.len() - 4]).unwrap();
    assert_eq!(resolved.id, note.id);
    assert!(resolve_note(&notes, "zzzz").is_err());
}

#[test]
fn unchanged_edit_does_not_queue_an_update() {
    let dir = TempDir::new().unwrap();
    let notes = local_context(&dir).open_notes().unwrap();
    let note = add_note("title", "body", &notes).unwrap();

    let same = apply_edit(&note, "title", "body", &notes).unwrap();
    assert_eq!(same.version, note.version);

    let edited = apply_edit(&note, "title", "new body", &notes).unwrap();
    assert_eq!(edited.version, note.version + 1);
    assert_eq!(edited.body, "new body");
    // Unsent create absorbs the edit.
    assert_eq!(notes.pending_operations().unwrap().len(), 1);

    assert!(matches!(
        apply_edit(&edited, "", " ", &notes),
        Err(CliError::EmptyEditedContent)
    ));
}

#[test]
fn attach_and_clear_reference() {
    let dir = TempDir::new().unwrap();
    let notes = local_context(&dir).open_notes().unwrap();
    let note = add_note("photo", "", &notes).unwrap();
    let id = note.id.to_string();

    run_attach(
        &id,
        Some(AttachmentKindArg::Image),
        Some("file:///tmp/cat.png"),
        false,
        &notes,
    )
    .unwrap();
    let attached = notes.get_note(&note.id).unwrap();
    let attachment = attached.attachment.unwrap();
    assert_eq!(attachment.kind, AttachmentKind::Image);
    assert_eq!(attachment.url, "file:///tmp/cat.png");

    run_attach(&id, None, None, true, &notes).unwrap();
    assert_eq!(notes.get_note(&note.id).unwrap().attachment, None);

    assert!(run_attach(&id, Some(AttachmentKindArg::Audio), None, false, &notes).is_err());
}

#[test]
fn delete_hides_note_and_discards_unsent_create() {
    let dir = TempDir::new().unwrap();
    let notes = local_context(&dir).open_notes().unwrap();
    let note = add_note("temporary", "", &notes).unwrap();

    run_delete(&note.id.to_string(), &notes).unwrap();

    assert!(notes.get_note(&note.id).is_err());
    assert!(notes.pending_operations().unwrap().is_empty());
}

#[test]
fn pending_lines_show_kind_and_base() {
    let dir = TempDir::new().unwrap();
    let notes = local_context(&dir).open_notes().unwrap();
    add_note("queued", "", &notes).unwrap();

    let lines = format_pending_lines(&notes.pending_operations().unwrap());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("create"));
    assert!(lines[0].contains("base=0"));
}

#[test]
fn merge_profile_normalizes_and_validates() {
    let mut profile = CliProfile::default();
    merge_profile(
        &mut profile,
        Some(" alice ".to_string()),
        Some("http://localhost:8080/".to_string()),
    )
    .unwrap();
    assert_eq!(profile.owner_id.as_deref(), Some("alice"));
    assert_eq!(
        profile.api_base_url.as_deref(),
        Some("http://localhost:8080")
    );

    assert!(merge_profile(&mut profile, None, Some("localhost:8080".to_string())).is_err());
    assert_eq!(
        profile.api_base_url.as_deref(),
        Some("http://localhost:8080")
    );
}

#[test]
fn sync_requires_remote_configuration() {
    let dir = TempDir::new().unwrap();
    let context = local_context(&dir);
    assert!(matches!(
        context.open_sync(),
        Err(CliError::SyncNotConfigured)
    ));
}

#[test]
fn sync_report_lines_mention_failures_and_conflicts() {
    let report = SyncReport {
        pull: Some(PullReport {
            applied: 2,
            purged: 1,
            deferred: 0,
            skipped: 0,
            checkpoint: 7,
        }),
        drain: DrainReport {
            acked: 3,
            conflicts: 1,
            requeued: 0,
            failures: vec!["abc: network unreachable".to_string()],
        },
    };

    let lines = format_sync_report(&report);
    assert_eq!(
        lines[0],
        "Pulled: 2 applied, 1 removed, 0 deferred (checkpoint 7)"
    );
    assert_eq!(lines[1], "Pushed: 3 acknowledged, 1 conflicts, 0 re-queued");
    assert_eq!(lines[2], "Still pending: abc: network unreachable");
    assert!(lines[3].contains("scrawl sync conflicts"));
}

#[test]
fn status_line_includes_error() {
    let status = SyncStatus {
        phase: SyncPhase::Pending,
        pending_ops: 2,
        last_synced_at: None,
        last_error: Some("timed out".to_string()),
    };
    assert_eq!(
        format_status_line(&status),
        "pending  pending=2 error=\"timed out\""
    );
}

#[test]
fn completions_name_the_binary() {
    for shell in [
        CompletionShell::Bash,
        CompletionShell::Zsh,
        CompletionShell::Fish,
    ] {
        let rendered = String::from_utf8(render_completions(shell)).unwrap();
        assert!(rendered.contains("scrawl"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn conflict_can_be_listed_and_resolved() {
    let remote = InMemoryRemote::new();
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let context_a = local_context(&dir_a);
    let context_b = local_context(&dir_b);

    let device = |context: &CliContext| {
        let notes = context.open_notes().unwrap();
        let engine = SyncEngine::new(
            Arc::clone(notes.store()),
            remote.clone(),
            Session::local(notes.owner_id().clone()),
            scrawl_core::SyncSettings::default(),
        )
        .unwrap();
        (notes, engine)
    };
    let (notes_a, engine_a) = device(&context_a);
    let (notes_b, engine_b) = device(&context_b);

    let note = add_note("shared", "v1", &notes_a).unwrap();
    engine_a.sync_once().await.unwrap();
    engine_b.sync_once().await.unwrap();

    notes_a.update_note(&note.id, "shared", "from a").unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    notes_b.update_note(&note.id, "shared", "from b").unwrap();
    engine_b.sync_once().await.unwrap();
    let report = engine_a.sync_once().await.unwrap();
    assert_eq!(report.drain.conflicts, 1);

    let shadows = notes_a.conflicts(None).unwrap();
    assert_eq!(shadows.len(), 1);
    assert!(format_conflict_lines(&shadows)[0].contains("local"));
    assert_eq!(
        notes_a.get_note(&note.id).unwrap().sync_state,
        SyncState::Conflicted
    );

    run_sync_resolve(&note.id.to_string(), &notes_a).unwrap();
    assert!(notes_a.conflicts(None).unwrap().is_empty());
    let resolved = notes_a.get_note(&note.id).unwrap();
    assert_eq!(resolved.body, "from b");
    assert_eq!(resolved.sync_state, SyncState::Clean);
}

#[test]
fn cloned_services_share_one_store() {
    let dir = TempDir::new().unwrap();
    let notes: NoteService = local_context(&dir).open_notes().unwrap();
    let clone = notes.clone();
    add_note("shared store", "", &clone).unwrap();
    assert_eq!(notes.list_notes().unwrap().len(), 1);
}
