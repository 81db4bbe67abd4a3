//! Full-text index maintenance and search queries.
//!
//! The `note_search` FTS5 table is written only by the helpers in this
//! module, and the helpers are called only from inside the owning note
//! mutation's transaction. An index write outside that transaction is a
//! bug, which is why they take the raw connection rather than the store.

use rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;
use crate::store::notes::note_row_mapper;
use crate::store::types::{Note, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use crate::store::Store;

/// Insert the index entry for a freshly created note.
pub(crate) fn index_note(conn: &Connection, note: &Note) -> Result<()> {
    conn.execute(
        "INSERT INTO note_search (note_id, title, content, tags) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            note.id.to_string(),
            note.title,
            note.content,
            note.tags.join(" "),
        ],
    )?;
    Ok(())
}

/// Replace the index entry for an updated note.
///
/// Delete-then-insert rather than an in-place patch, so terms from the
/// previous revision cannot linger as stale matches.
pub(crate) fn reindex_note(conn: &Connection, note: &Note) -> Result<()> {
    deindex_note(conn, &note.id)?;
    index_note(conn, note)
}

/// Remove the index entry for a deleted note.
pub(crate) fn deindex_note(conn: &Connection, note_id: &Uuid) -> Result<()> {
    conn.execute(
        "DELETE FROM note_search WHERE note_id = ?",
        [note_id.to_string()],
    )?;
    Ok(())
}

/// Remove index entries for every note in a project, called before the
/// project row delete cascades the base notes away.
pub(crate) fn deindex_project_notes(conn: &Connection, project_id: &Uuid) -> Result<()> {
    conn.execute(
        "DELETE FROM note_search
         WHERE note_id IN (SELECT id FROM notes WHERE project_id = ?)",
        [project_id.to_string()],
    )?;
    Ok(())
}

/// Build an FTS5 match expression from raw query text.
///
/// Each whitespace token is double-quoted (with embedded quotes doubled)
/// so FTS5 operator syntax in user input cannot change query semantics.
/// Returns `None` when no searchable token remains.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|token| token.chars().any(|c| c.is_alphanumeric()))
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl Store {
    /// Search notes by relevance over title, content, and tags.
    ///
    /// Restricted to `project_id` when supplied. `limit` defaults to
    /// `DEFAULT_SEARCH_LIMIT` and is capped at `MAX_SEARCH_LIMIT`. An
    /// empty query returns no hits.
    pub fn search_notes(
        &self,
        query: &str,
        project_id: Option<&Uuid>,
        limit: Option<u32>,
    ) -> Result<Vec<Note>> {
        let Some(match_expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT);

        self.read(|conn| {
            let mut sql = String::from(
                "SELECT n.id, n.project_id, n.title, n.content, n.file_path, n.size_bytes,
                        n.is_pinned, n.tags_json, n.created_at, n.updated_at
                 FROM note_search f
                 JOIN notes n ON n.id = f.note_id
                 WHERE note_search MATCH ?",
            );
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(match_expr)];

            if let Some(project_id) = project_id {
                sql.push_str(" AND n.project_id = ?");
                params.push(Box::new(project_id.to_string()));
            }
            sql.push_str(" ORDER BY bm25(note_search), n.created_at DESC LIMIT ?");
            params.push(Box::new(i64::from(limit)));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), note_row_mapper)?;

            let mut notes = Vec::new();
            for row in rows {
                notes.push(row?.try_into()?);
            }
            Ok(notes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_expr_quotes_tokens() {
        assert_eq!(fts_match_expr("alpha beta"), Some("\"alpha\" \"beta\"".to_string()));
        assert_eq!(fts_match_expr("  "), None);
        assert_eq!(fts_match_expr(""), None);
        // No searchable characters at all.
        assert_eq!(fts_match_expr("\" * -"), None);
    }

    #[test]
    fn match_expr_neutralizes_fts_operators() {
        // NEAR/OR/NOT and column filters must arrive as plain terms.
        assert_eq!(fts_match_expr("NOT"), Some("\"NOT\"".to_string()));
        assert_eq!(
            fts_match_expr("title:x OR y"),
            Some("\"title:x\" \"OR\" \"y\"".to_string())
        );
        assert_eq!(fts_match_expr("a\"b"), Some("\"a\"\"b\"".to_string()));
    }
}
