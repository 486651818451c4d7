use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use scrawl_core::models::{ConflictShadow, PendingOperation};
use scrawl_core::{
    HttpRemoteNoteService, LocalStore, Note, NoteId, NoteService, Session, SyncEngine,
};
use serde::Serialize;

use crate::auth::resolve_access_token;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Resolved invocation context: where the store lives and which profile applies.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub profile_name: String,
    pub profile: CliProfile,
}

impl CliContext {
    pub fn load(db_path: Option<PathBuf>, profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        Ok(Self {
            db_path: resolve_db_path(db_path)?,
            profile_name,
            profile,
        })
    }

    /// Context over an explicit store path and profile, bypassing the config file.
    pub fn with_profile(db_path: PathBuf, profile_name: &str, profile: CliProfile) -> Self {
        Self {
            db_path,
            profile_name: profile_name.to_string(),
            profile,
        }
    }

    fn open_store(&self) -> Result<Arc<LocalStore>, CliError> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Arc::new(LocalStore::open(&self.db_path)?))
    }

    fn local_session(&self) -> Result<Session, CliError> {
        let owner_id = self.profile.owner_id().map_err(CliError::Config)?;
        Ok(Session::local(owner_id))
    }

    pub fn open_notes(&self) -> Result<NoteService, CliError> {
        Ok(NoteService::new(self.open_store()?, self.local_session()?))
    }

    /// Facade plus an HTTP-backed engine sharing the same store.
    pub fn open_sync(
        &self,
    ) -> Result<(NoteService, SyncEngine<HttpRemoteNoteService>), CliError> {
        let Some(base_url) = self.profile.api_base_url().map_err(CliError::Config)? else {
            return Err(CliError::SyncNotConfigured);
        };
        let Some((token, source)) = resolve_access_token(&self.profile_name)? else {
            return Err(CliError::SyncNotConfigured);
        };
        let settings = self.profile.sync_settings().map_err(CliError::Config)?;

        let owner_id = self.profile.owner_id().map_err(CliError::Config)?;
        let session = Session::new(owner_id, Some(token));
        let store = self.open_store()?;
        let remote = HttpRemoteNoteService::new(&base_url, &session)?;
        tracing::debug!(
            profile = %self.profile_name,
            token_source = source.as_str(),
            %base_url,
            "Opening sync engine"
        );

        let notes = NoteService::new(Arc::clone(&store), session.clone());
        let engine = SyncEngine::new(store, remote, session, settings)?;
        Ok((notes, engine))
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub body: String,
    pub attachment: Option<AttachmentItem>,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub version: i64,
    pub sync_state: String,
}

#[derive(Debug, Serialize)]
pub struct AttachmentItem {
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub op_id: i64,
    pub note_id: String,
    pub kind: String,
    pub base_version: i64,
    pub attempts: u32,
    pub in_flight: bool,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub note_id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub version: i64,
    pub updated_at: i64,
    pub deleted: bool,
    pub recorded_at: i64,
    pub recorded_at_iso: String,
}

pub fn list_notes(notes: &NoteService, limit: usize) -> Result<Vec<Note>, CliError> {
    let mut all = notes.list_notes()?;
    all.truncate(limit);
    Ok(all)
}

pub fn resolve_note(notes: &NoteService, note_query: &str) -> Result<Note, CliError> {
    let normalized = normalize_note_identifier(note_query)?;
    let id = notes.resolve_note_id(&normalized)?;
    Ok(notes.get_note(&id)?)
}

pub fn resolve_note_id(notes: &NoteService, note_query: &str) -> Result<NoteId, CliError> {
    let normalized = normalize_note_identifier(note_query)?;
    Ok(notes.resolve_note_id(&normalized)?)
}

pub fn short_id(id: &NoteId) -> String {
    id.to_string().chars().take(13).collect()
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(&note.id);
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            let marker = sync_marker(note);

            if marker.is_empty() {
                format!("{short_id:<13}  {preview:<40}  {relative_time}")
            } else {
                format!("{short_id:<13}  {preview:<40}  {relative_time:<10}  {marker}")
            }
        })
        .collect()
}

fn sync_marker(note: &Note) -> String {
    let mut markers = Vec::new();
    if note.attachment.is_some() {
        markers.push("[attachment]".to_string());
    }
    if note.sync_state != scrawl_core::models::SyncState::Clean {
        markers.push(format!("({})", note.sync_state));
    }
    markers.join(" ")
}

pub fn format_note_detail(note: &Note) -> Vec<String> {
    let mut lines = vec![
        format!("id:        {}", note.id),
        format!("title:     {}", note.title),
        format!(
            "updated:   {} ({})",
            format_timestamp(note.updated_at),
            format_relative_time(note.updated_at, Utc::now().timestamp_millis())
        ),
        format!(
            "version:   {} (remote {})",
            note.version, note.remote_version
        ),
        format!("sync:      {}", note.sync_state),
    ];
    if let Some(attachment) = &note.attachment {
        lines.push(format!("attach:    {} {}", attachment.kind, attachment.url));
    }
    if !note.body.is_empty() {
        lines.push(String::new());
        lines.extend(note.body.lines().map(str::to_string));
    }
    lines
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();

    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        body: note.body.clone(),
        attachment: note.attachment.as_ref().map(|attachment| AttachmentItem {
            kind: attachment.kind.to_string(),
            url: attachment.url.clone(),
        }),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
        version: note.version,
        sync_state: note.sync_state.to_string(),
    }
}

pub fn pending_to_item(op: &PendingOperation) -> PendingItem {
    PendingItem {
        op_id: op.op_id.0,
        note_id: op.note_id.to_string(),
        kind: op.kind.to_string(),
        base_version: op.base_version,
        attempts: op.attempts,
        in_flight: op.in_flight,
        created_at: op.created_at,
    }
}

pub fn format_pending_lines(ops: &[PendingOperation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    ops.iter()
        .map(|op| {
            let attempts = if op.attempts > 0 {
                format!("  attempts={}", op.attempts)
            } else {
                String::new()
            };
            format!(
                "{:<6}  {:<13}  {:<6}  base={:<4}  {}{attempts}",
                op.op_id.0,
                short_id(&op.note_id),
                op.kind.as_str(),
                op.base_version,
                format_relative_time(op.created_at, now_ms)
            )
        })
        .collect()
}

pub fn conflict_to_item(shadow: &ConflictShadow) -> ConflictItem {
    ConflictItem {
        note_id: shadow.note_id.to_string(),
        source: shadow.source.to_string(),
        title: shadow.title.clone(),
        body: shadow.body.clone(),
        version: shadow.version,
        updated_at: shadow.updated_at,
        deleted: shadow.deleted,
        recorded_at: shadow.recorded_at,
        recorded_at_iso: format_timestamp(shadow.recorded_at),
    }
}

pub fn format_conflict_lines(shadows: &[ConflictShadow]) -> Vec<String> {
    shadows
        .iter()
        .map(|shadow| {
            let summary = if shadow.deleted {
                "(deleted)".to_string()
            } else {
                compact_preview(&shadow.title, &shadow.body, 40)
            };
            format!(
                "{}  {:<6}  note={}  v{}  {}",
                format_timestamp(shadow.recorded_at),
                shadow.source.as_str(),
                short_id(&shadow.note_id),
                shadow.version,
                summary
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    compact_preview(&note.title, &note.body, max_chars)
}

fn compact_preview(title: &str, body: &str, max_chars: usize) -> String {
    let first_line = if title.trim().is_empty() {
        body.lines().next().unwrap_or("")
    } else {
        title
    };
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Body for a new note: arguments, then piped stdin, then the editor.
///
/// With a title present an empty body is accepted and the editor is skipped.
pub fn resolve_note_body(body_parts: &[String], has_title: bool) -> Result<String, CliError> {
    if let Some(body) = normalize_content(&body_parts.join(" ")) {
        return Ok(body);
    }

    if let Some(body) = read_piped_stdin()? {
        return Ok(body);
    }

    if has_title {
        return Ok(String::new());
    }

    if let Some(body) = capture_editor_input()? {
        return Ok(body);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("scrawl-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("SCRAWL_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("scrawl").join("scrawl.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}
