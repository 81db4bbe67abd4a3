//! Note records.
//!
//! Every mutation here updates the base row, the full-text index, and the
//! audit trail inside one transaction.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::audit::record_audit;
use crate::store::row::NoteRow;
use crate::store::search::{deindex_note, index_note, reindex_note};
use crate::store::types::{Actor, AuditAction, NewNote, Note, NoteFilter, NoteUpdate, Page, PageRequest};
use crate::store::validation::{
    normalize_tags, validate_content, validate_text, MAX_FILE_PATH_CHARS, MAX_TITLE_CHARS,
};
use crate::store::{now_rfc3339, Store};

const RESOURCE: &str = "note";

const NOTE_COLUMNS: &str = "id, project_id, title, content, file_path, size_bytes, \
                            is_pinned, tags_json, created_at, updated_at";

pub(crate) fn note_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        file_path: row.get(4)?,
        size_bytes: row.get(5)?,
        is_pinned: row.get(6)?,
        tags_json: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(crate) fn get_note_tx(conn: &Connection, id: &Uuid) -> Result<Option<Note>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM notes WHERE id = ?", NOTE_COLUMNS),
            [id.to_string()],
            note_row_mapper,
        )
        .optional()?;
    row.map(Note::try_from).transpose()
}

fn tags_to_json(tags: &[String]) -> Result<Option<String>> {
    if tags.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(tags)?))
    }
}

impl Store {
    /// Create a note and its search-index entry atomically.
    pub fn create_note(&self, actor: &Actor, new: NewNote) -> Result<Note> {
        validate_text("Note title", &new.title, MAX_TITLE_CHARS)?;
        validate_text("Note file path", &new.file_path, MAX_FILE_PATH_CHARS)?;
        validate_content(&new.content)?;
        let tags = normalize_tags(&new.tags)?;

        let id = Uuid::new_v4();
        let now = now_rfc3339();

        self.write_tx(|conn| {
            let project_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?)",
                [new.project_id.to_string()],
                |row| row.get(0),
            )?;
            if !project_exists {
                return Err(StoreError::NotFound(format!("Project {}", new.project_id)));
            }

            conn.execute(
                r#"
                INSERT INTO notes (id, project_id, title, content, file_path, size_bytes,
                                   is_pinned, tags_json, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                "#,
                rusqlite::params![
                    id.to_string(),
                    new.project_id.to_string(),
                    new.title,
                    new.content,
                    new.file_path,
                    new.content.len() as i64,
                    new.is_pinned,
                    tags_to_json(&tags)?,
                    now,
                ],
            )?;

            let note = get_note_tx(conn, &id)?
                .ok_or_else(|| StoreError::Storage("Note vanished after insert".to_string()))?;
            index_note(conn, &note)?;
            record_audit(
                conn,
                actor,
                AuditAction::Create,
                RESOURCE,
                &id.to_string(),
                None,
                Some(&serde_json::to_value(&note)?),
            )?;
            Ok(note)
        })
    }

    pub fn get_note(&self, id: &Uuid) -> Result<Option<Note>> {
        self.read(|conn| get_note_tx(conn, id))
    }

    /// List notes with AND-combined filters, newest first.
    pub fn list_notes(&self, filter: &NoteFilter, page: PageRequest) -> Result<Page<Note>> {
        let (page_no, page_size) = page.validated()?;
        let tag = match filter.tag {
            Some(ref tag) => normalize_tags(std::slice::from_ref(tag))?.into_iter().next(),
            None => None,
        };

        self.read(|conn| {
            let mut conditions: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(project_id) = filter.project_id {
                conditions.push("project_id = ?".to_string());
                params.push(Box::new(project_id.to_string()));
            }
            if let Some(is_pinned) = filter.is_pinned {
                conditions.push("is_pinned = ?".to_string());
                params.push(Box::new(is_pinned));
            }
            if let Some(ref tag) = tag {
                conditions.push(
                    "tags_json IS NOT NULL AND EXISTS (SELECT 1 FROM json_each(tags_json) WHERE value = ?)"
                        .to_string(),
                );
                params.push(Box::new(tag.clone()));
            }

            let where_clause = if conditions.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", conditions.join(" AND "))
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM notes{}", where_clause),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let query = format!(
                "SELECT {} FROM notes{} ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
                NOTE_COLUMNS, where_clause
            );
            params.push(Box::new(i64::from(page_size)));
            params.push(Box::new(page.offset()));

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), note_row_mapper)?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row?.try_into()?);
            }
            Ok(Page::new(items, page_no, page_size, total as u64))
        })
    }

    /// Apply a partial update and resynchronize the search index.
    pub fn update_note(&self, actor: &Actor, id: &Uuid, update: NoteUpdate) -> Result<Note> {
        if let Some(ref title) = update.title {
            validate_text("Note title", title, MAX_TITLE_CHARS)?;
        }
        if let Some(ref file_path) = update.file_path {
            validate_text("Note file path", file_path, MAX_FILE_PATH_CHARS)?;
        }
        if let Some(ref content) = update.content {
            validate_content(content)?;
        }
        let tags = update.tags.as_deref().map(normalize_tags).transpose()?;

        self.write_tx(|conn| {
            let before = get_note_tx(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Note {}", id)))?;

            let title = update.title.unwrap_or_else(|| before.title.clone());
            let content = update.content.unwrap_or_else(|| before.content.clone());
            let file_path = update.file_path.unwrap_or_else(|| before.file_path.clone());
            let is_pinned = update.is_pinned.unwrap_or(before.is_pinned);
            let tags = tags.unwrap_or_else(|| before.tags.clone());

            conn.execute(
                r#"
                UPDATE notes
                SET title = ?1, content = ?2, file_path = ?3, size_bytes = ?4,
                    is_pinned = ?5, tags_json = ?6, updated_at = ?7
                WHERE id = ?8
                "#,
                rusqlite::params![
                    title,
                    content,
                    file_path,
                    content.len() as i64,
                    is_pinned,
                    tags_to_json(&tags)?,
                    now_rfc3339(),
                    id.to_string(),
                ],
            )?;

            let after = get_note_tx(conn, id)?
                .ok_or_else(|| StoreError::Storage("Note vanished after update".to_string()))?;
            reindex_note(conn, &after)?;
            record_audit(
                conn,
                actor,
                AuditAction::Update,
                RESOURCE,
                &id.to_string(),
                Some(&serde_json::to_value(&before)?),
                Some(&serde_json::to_value(&after)?),
            )?;
            Ok(after)
        })
    }

    /// Delete a note, its search-index entry, and its task links.
    ///
    /// Deleting twice returns `NotFound` the second time.
    pub fn delete_note(&self, actor: &Actor, id: &Uuid) -> Result<()> {
        self.write_tx(|conn| {
            let before = get_note_tx(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Note {}", id)))?;

            deindex_note(conn, id)?;
            conn.execute("DELETE FROM notes WHERE id = ?", [id.to_string()])?;

            record_audit(
                conn,
                actor,
                AuditAction::Delete,
                RESOURCE,
                &id.to_string(),
                Some(&serde_json::to_value(&before)?),
                None,
            )?;
            Ok(())
        })
    }
}
