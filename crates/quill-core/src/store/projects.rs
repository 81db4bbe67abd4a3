//! Project records.
//!
//! Projects exclusively own their notes and tasks; deleting a project
//! removes both, their task-note links, and the owned notes' search-index
//! entries, all in one transaction.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::audit::record_audit;
use crate::store::row::ProjectRow;
use crate::store::search::deindex_project_notes;
use crate::store::types::{
    Actor, AuditAction, NewProject, Page, PageRequest, Project, ProjectFilter, ProjectUpdate,
};
use crate::store::validation::{
    validate_color, validate_opt_text, validate_text, MAX_DESCRIPTION_CHARS,
    MAX_PROJECT_NAME_CHARS,
};
use crate::store::{now_rfc3339, Store};

const RESOURCE: &str = "project";

const PROJECT_COLUMNS: &str =
    "id, name, description, color, is_archived, owner_id, created_at, updated_at";

fn project_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
        is_archived: row.get(4)?,
        owner_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) fn get_project_tx(conn: &Connection, id: &Uuid) -> Result<Option<Project>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS),
            [id.to_string()],
            project_row_mapper,
        )
        .optional()?;
    row.map(Project::try_from).transpose()
}

impl Store {
    pub fn create_project(&self, actor: &Actor, new: NewProject) -> Result<Project> {
        validate_text("Project name", &new.name, MAX_PROJECT_NAME_CHARS)?;
        validate_opt_text(
            "Project description",
            new.description.as_deref(),
            MAX_DESCRIPTION_CHARS,
        )?;
        validate_color(&new.color)?;

        let id = Uuid::new_v4();
        let now = now_rfc3339();

        self.write_tx(|conn| {
            let owner_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)",
                [new.owner_id.to_string()],
                |row| row.get(0),
            )?;
            if !owner_exists {
                return Err(StoreError::NotFound(format!("User {}", new.owner_id)));
            }

            conn.execute(
                r#"
                INSERT INTO projects (id, name, description, color, is_archived, owner_id,
                                      created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)
                "#,
                rusqlite::params![
                    id.to_string(),
                    new.name,
                    new.description,
                    new.color,
                    new.owner_id.to_string(),
                    now,
                ],
            )?;

            let project = get_project_tx(conn, &id)?
                .ok_or_else(|| StoreError::Storage("Project vanished after insert".to_string()))?;
            record_audit(
                conn,
                actor,
                AuditAction::Create,
                RESOURCE,
                &id.to_string(),
                None,
                Some(&serde_json::to_value(&project)?),
            )?;
            Ok(project)
        })
    }

    pub fn get_project(&self, id: &Uuid) -> Result<Option<Project>> {
        self.read(|conn| get_project_tx(conn, id))
    }

    /// List projects with AND-combined filters, newest first.
    pub fn list_projects(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<Page<Project>> {
        let (page_no, page_size) = page.validated()?;

        self.read(|conn| {
            let mut conditions: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(owner_id) = filter.owner_id {
                conditions.push("owner_id = ?".to_string());
                params.push(Box::new(owner_id.to_string()));
            }
            if let Some(is_archived) = filter.is_archived {
                conditions.push("is_archived = ?".to_string());
                params.push(Box::new(is_archived));
            }

            let where_clause = if conditions.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", conditions.join(" AND "))
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM projects{}", where_clause),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let query = format!(
                "SELECT {} FROM projects{} ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
                PROJECT_COLUMNS, where_clause
            );
            params.push(Box::new(i64::from(page_size)));
            params.push(Box::new(page.offset()));

            let mut stmt = conn.prepare(&query)?;
            let rows =
                stmt.query_map(rusqlite::params_from_iter(params.iter()), project_row_mapper)?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row?.try_into()?);
            }
            Ok(Page::new(items, page_no, page_size, total as u64))
        })
    }

    /// Apply a partial update. Only supplied fields change; `updated_at`
    /// is refreshed.
    pub fn update_project(
        &self,
        actor: &Actor,
        id: &Uuid,
        update: ProjectUpdate,
    ) -> Result<Project> {
        if let Some(ref name) = update.name {
            validate_text("Project name", name, MAX_PROJECT_NAME_CHARS)?;
        }
        if let Some(Some(ref description)) = update.description {
            validate_opt_text(
                "Project description",
                Some(description.as_str()),
                MAX_DESCRIPTION_CHARS,
            )?;
        }
        if let Some(ref color) = update.color {
            validate_color(color)?;
        }

        self.write_tx(|conn| {
            let before = get_project_tx(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Project {}", id)))?;

            let name = update.name.unwrap_or_else(|| before.name.clone());
            let description = match update.description {
                Some(ref value) => value.clone(),
                None => before.description.clone(),
            };
            let color = update.color.unwrap_or_else(|| before.color.clone());
            let is_archived = update.is_archived.unwrap_or(before.is_archived);

            conn.execute(
                r#"
                UPDATE projects
                SET name = ?1, description = ?2, color = ?3, is_archived = ?4, updated_at = ?5
                WHERE id = ?6
                "#,
                rusqlite::params![
                    name,
                    description,
                    color,
                    is_archived,
                    now_rfc3339(),
                    id.to_string(),
                ],
            )?;

            let after = get_project_tx(conn, id)?
                .ok_or_else(|| StoreError::Storage("Project vanished after update".to_string()))?;
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

    /// Delete a project and everything it owns: notes (with their search
    /// entries), tasks, and task-note links.
    pub fn delete_project(&self, actor: &Actor, id: &Uuid) -> Result<()> {
        self.write_tx(|conn| {
            let before = get_project_tx(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Project {}", id)))?;

            // FTS rows are not covered by foreign-key cascades; clear them
            // before the base notes go.
            deindex_project_notes(conn, id)?;

            let notes: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notes WHERE project_id = ?",
                [id.to_string()],
                |row| row.get(0),
            )?;
            let tasks: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE project_id = ?",
                [id.to_string()],
                |row| row.get(0),
            )?;

            conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
            info!(project = %id, notes, tasks, "project deleted with cascade");

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
