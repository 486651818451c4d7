//! Row-level SQL for notes, pending operations, shadows, and checkpoints

use crate::error::{Error, Result};
use crate::models::{
    Attachment, AttachmentKind, ConflictShadow, Note, NoteId, OpId, OpKind, OwnerId,
    PendingOperation,
};
use crate::util::unix_millis_now;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

const NOTE_COLUMNS: &str = "id, owner_id, title, body, attachment_kind, attachment_url, \
     created_at, updated_at, version, remote_version, is_deleted, sync_state";

const PENDING_COLUMNS: &str =
    "op_id, note_id, kind, payload, base_version, in_flight, attempts, created_at";

const SHADOW_COLUMNS: &str = "id, note_id, source, title, body, attachment_kind, attachment_url, \
     version, updated_at, is_deleted, recorded_at";

/// `SQLite` repository over a borrowed connection or transaction
pub struct SqliteNoteRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteNoteRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                params![id.as_str()],
                parse_note,
            )
            .optional()?;
        Ok(note)
    }

    /// Visible notes of an owner, newest first
    pub fn list(&self, owner_id: &OwnerId) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS}
             FROM notes
             WHERE owner_id = ?1 AND is_deleted = 0
             ORDER BY updated_at DESC, id DESC"
        ))?;

        let notes = stmt
            .query_map(params![owner_id.as_str()], parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes)
    }

    /// Visible note ids starting with `prefix`, newest first
    pub fn ids_by_prefix(
        &self,
        owner_id: &OwnerId,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT id FROM notes
             WHERE owner_id = ?1 AND id LIKE ?2 AND is_deleted = 0
             ORDER BY updated_at DESC
             LIMIT ?3",
        )?;

        let ids = stmt
            .query_map(
                params![owner_id.as_str(), format!("{prefix}%"), to_sql_limit(limit)],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ids)
    }

    pub fn upsert(&self, note: &Note) -> Result<()> {
        let (attachment_kind, attachment_url) = split_attachment(note.attachment.as_ref());
        self.conn.execute(
            "INSERT INTO notes (id, owner_id, title, body, attachment_kind, attachment_url,
                                created_at, updated_at, version, remote_version, is_deleted, sync_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                title = excluded.title,
                body = excluded.body,
                attachment_kind = excluded.attachment_kind,
                attachment_url = excluded.attachment_url,
                updated_at = excluded.updated_at,
                version = excluded.version,
                remote_version = excluded.remote_version,
                is_deleted = excluded.is_deleted,
                sync_state = excluded.sync_state",
            params![
                note.id.as_str(),
                note.owner_id.as_str(),
                note.title,
                note.body,
                attachment_kind,
                attachment_url,
                note.created_at,
                note.updated_at,
                note.version,
                note.remote_version,
                i32::from(note.deleted),
                note.sync_state.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_note(&self, id: &NoteId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    pub fn insert_pending(
        &self,
        note_id: &NoteId,
        kind: OpKind,
        payload: Option<&Note>,
        base_version: i64,
    ) -> Result<PendingOperation> {
        let payload_json = payload.map(serde_json::to_string).transpose()?;
        let created_at = unix_millis_now();
        self.conn.execute(
            "INSERT INTO pending_ops (note_id, kind, payload, base_version, in_flight, attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
            params![note_id.as_str(), kind.as_str(), payload_json, base_version, created_at],
        )?;

        Ok(PendingOperation {
            op_id: OpId(self.conn.last_insert_rowid()),
            note_id: *note_id,
            kind,
            payload: payload.cloned(),
            base_version,
            in_flight: false,
            attempts: 0,
            created_at,
        })
    }

    /// Queued operations of one note in insertion order
    pub fn pending_for_note(&self, note_id: &NoteId) -> Result<Vec<PendingOperation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_ops WHERE note_id = ?1 ORDER BY op_id"
        ))?;
        let ops = stmt
            .query_map(params![note_id.as_str()], parse_pending)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    pub fn next_pending(&self, note_id: &NoteId) -> Result<Option<PendingOperation>> {
        let op = self
            .conn
            .query_row(
                &format!(
                    "SELECT {PENDING_COLUMNS} FROM pending_ops WHERE note_id = ?1 ORDER BY op_id LIMIT 1"
                ),
                params![note_id.as_str()],
                parse_pending,
            )
            .optional()?;
        Ok(op)
    }

    pub fn get_pending(&self, op_id: OpId) -> Result<Option<PendingOperation>> {
        let op = self
            .conn
            .query_row(
                &format!("SELECT {PENDING_COLUMNS} FROM pending_ops WHERE op_id = ?1"),
                params![op_id.0],
                parse_pending,
            )
            .optional()?;
        Ok(op)
    }

    pub fn list_pending(&self, owner_id: &OwnerId) -> Result<Vec<PendingOperation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_ops
             WHERE note_id IN (SELECT id FROM notes WHERE owner_id = ?1)
             ORDER BY op_id"
        ))?;
        let ops = stmt
            .query_map(params![owner_id.as_str()], parse_pending)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    /// Owner's notes with queued operations, oldest queue first
    pub fn pending_note_ids(&self, owner_id: &OwnerId) -> Result<Vec<NoteId>> {
        let mut stmt = self.conn.prepare(
            "SELECT note_id FROM pending_ops
             WHERE note_id IN (SELECT id FROM notes WHERE owner_id = ?1)
             GROUP BY note_id
             ORDER BY MIN(op_id)",
        )?;
        let ids = stmt
            .query_map(params![owner_id.as_str()], |row| {
                let raw: String = row.get(0)?;
                raw.parse::<NoteId>()
                    .map_err(|error| conversion_error(0, Box::new(error)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn count_pending(&self, owner_id: &OwnerId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_ops
             WHERE note_id IN (SELECT id FROM notes WHERE owner_id = ?1)",
            params![owner_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn has_pending(&self, note_id: &NoteId) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pending_ops WHERE note_id = ?1)",
            params![note_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn replace_pending_payload(&self, op_id: OpId, payload: &Note) -> Result<()> {
        let payload_json = serde_json::to_string(payload)?;
        let rows = self.conn.execute(
            "UPDATE pending_ops SET payload = ?1 WHERE op_id = ?2 AND in_flight = 0",
            params![payload_json, op_id.0],
        )?;
        if rows == 0 {
            return Err(Error::InvalidInput(format!(
                "pending operation {op_id} is missing or in flight"
            )));
        }
        Ok(())
    }

    pub fn delete_pending(&self, op_id: OpId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM pending_ops WHERE op_id = ?1", params![op_id.0])?;
        Ok(rows > 0)
    }

    pub fn delete_pending_for_note(&self, note_id: &NoteId) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM pending_ops WHERE note_id = ?1",
            params![note_id.as_str()],
        )?;
        Ok(rows)
    }

    pub fn set_in_flight(&self, op_id: OpId, in_flight: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE pending_ops SET in_flight = ?1 WHERE op_id = ?2",
            params![i32::from(in_flight), op_id.0],
        )?;
        Ok(())
    }

    pub fn reset_in_flight(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute("UPDATE pending_ops SET in_flight = 0 WHERE in_flight = 1", [])?;
        Ok(rows)
    }

    pub fn record_attempt(&self, op_id: OpId) -> Result<()> {
        self.conn.execute(
            "UPDATE pending_ops SET attempts = attempts + 1, in_flight = 0 WHERE op_id = ?1",
            params![op_id.0],
        )?;
        Ok(())
    }

    pub fn insert_shadow(&self, shadow: &ConflictShadow) -> Result<i64> {
        let (attachment_kind, attachment_url) = split_attachment(shadow.attachment.as_ref());
        self.conn.execute(
            "INSERT INTO conflict_shadows (note_id, source, title, body, attachment_kind,
                                           attachment_url, version, updated_at, is_deleted, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                shadow.note_id.as_str(),
                shadow.source.as_str(),
                shadow.title,
                shadow.body,
                attachment_kind,
                attachment_url,
                shadow.version,
                shadow.updated_at,
                i32::from(shadow.deleted),
                shadow.recorded_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Shadows newest first, optionally for one note
    pub fn list_shadows(&self, note_id: Option<&NoteId>) -> Result<Vec<ConflictShadow>> {
        let shadows = if let Some(note_id) = note_id {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {SHADOW_COLUMNS} FROM conflict_shadows WHERE note_id = ?1
                 ORDER BY recorded_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map(params![note_id.as_str()], parse_shadow)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {SHADOW_COLUMNS} FROM conflict_shadows ORDER BY recorded_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([], parse_shadow)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(shadows)
    }

    pub fn delete_shadows(&self, note_id: &NoteId) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM conflict_shadows WHERE note_id = ?1",
            params![note_id.as_str()],
        )?;
        Ok(rows)
    }

    pub fn checkpoint(&self, owner_id: &OwnerId) -> Result<u64> {
        let revision = self
            .conn
            .query_row(
                "SELECT revision FROM sync_checkpoints WHERE owner_id = ?1",
                params![owner_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(u64::try_from(revision).unwrap_or_default())
    }

    pub fn set_checkpoint(&self, owner_id: &OwnerId, revision: u64) -> Result<()> {
        let revision = i64::try_from(revision)
            .map_err(|_| Error::InvalidInput(format!("checkpoint {revision} out of range")))?;
        self.conn.execute(
            "INSERT INTO sync_checkpoints (owner_id, revision, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner_id) DO UPDATE SET
                revision = MAX(revision, excluded.revision),
                updated_at = excluded.updated_at",
            params![owner_id.as_str(), revision, unix_millis_now()],
        )?;
        Ok(())
    }
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn split_attachment(attachment: Option<&Attachment>) -> (Option<&'static str>, Option<&str>) {
    attachment.map_or((None, None), |attachment| {
        (Some(attachment.kind.as_str()), Some(attachment.url.as_str()))
    })
}

fn conversion_error(
    index: usize,
    error: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, error)
}

fn parse_attachment(
    row: &Row<'_>,
    kind_index: usize,
    url_index: usize,
) -> rusqlite::Result<Option<Attachment>> {
    let kind: Option<String> = row.get(kind_index)?;
    let url: Option<String> = row.get(url_index)?;
    match (kind, url) {
        (Some(kind), Some(url)) => {
            let kind = kind
                .parse::<AttachmentKind>()
                .map_err(|error| conversion_error(kind_index, Box::new(error)))?;
            Ok(Some(Attachment { kind, url }))
        }
        _ => Ok(None),
    }
}

/// Parse a note from a database row
fn parse_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let id: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let sync_state: String = row.get(11)?;
    Ok(Note {
        id: id
            .parse()
            .map_err(|error| conversion_error(0, Box::new(error)))?,
        owner_id: OwnerId::new(owner_id).map_err(|error| conversion_error(1, Box::new(error)))?,
        title: row.get(2)?,
        body: row.get(3)?,
        attachment: parse_attachment(row, 4, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        version: row.get(8)?,
        remote_version: row.get(9)?,
        deleted: row.get::<_, i32>(10)? != 0,
        sync_state: sync_state
            .parse()
            .map_err(|error| conversion_error(11, Box::new(error)))?,
    })
}

fn parse_pending(row: &Row<'_>) -> rusqlite::Result<PendingOperation> {
    let note_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let payload: Option<String> = row.get(3)?;
    let payload = payload
        .map(|raw| serde_json::from_str::<Note>(&raw))
        .transpose()
        .map_err(|error| conversion_error(3, Box::new(error)))?;
    Ok(PendingOperation {
        op_id: OpId(row.get(0)?),
        note_id: note_id
            .parse()
            .map_err(|error| conversion_error(1, Box::new(error)))?,
        kind: kind
            .parse()
            .map_err(|error| conversion_error(2, Box::new(error)))?,
        payload,
        base_version: row.get(4)?,
        in_flight: row.get::<_, i32>(5)? != 0,
        attempts: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn parse_shadow(row: &Row<'_>) -> rusqlite::Result<ConflictShadow> {
    let note_id: String = row.get(1)?;
    let source: String = row.get(2)?;
    Ok(ConflictShadow {
        id: row.get(0)?,
        note_id: note_id
            .parse()
            .map_err(|error| conversion_error(1, Box::new(error)))?,
        source: source
            .parse()
            .map_err(|error| conversion_error(2, Box::new(error)))?,
        title: row.get(3)?,
        body: row.get(4)?,
        attachment: parse_attachment(row, 5, 6)?,
        version: row.get(7)?,
        updated_at: row.get(8)?,
        deleted: row.get::<_, i32>(9)? != 0,
        recorded_at: row.get(10)?,
    })
}
