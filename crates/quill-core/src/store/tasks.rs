//! Task records, subtask hierarchy, and task-note links.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::audit::record_audit;
use crate::store::hierarchy::{assert_valid_parent, has_children, reparent_children};
use crate::store::notes::{get_note_tx, note_row_mapper};
use crate::store::row::TaskRow;
use crate::store::types::{
    Actor, AuditAction, NewTask, Note, Page, PageRequest, Task, TaskFilter, TaskUpdate,
};
use crate::store::validation::{
    normalize_tags, validate_completion, validate_hours, validate_opt_text, validate_text,
    MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS,
};
use crate::store::{now_rfc3339, Store};

const RESOURCE: &str = "task";
const LINK_RESOURCE: &str = "task_note";

const TASK_COLUMNS: &str = "id, project_id, title, description, status, priority, start_date, \
                            deadline, estimated_hours, actual_hours, completion, tags_json, \
                            creator_id, assignee_id, parent_task_id, created_at, updated_at";

fn task_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        start_date: row.get(6)?,
        deadline: row.get(7)?,
        estimated_hours: row.get(8)?,
        actual_hours: row.get(9)?,
        completion: row.get(10)?,
        tags_json: row.get(11)?,
        creator_id: row.get(12)?,
        assignee_id: row.get(13)?,
        parent_task_id: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

pub(crate) fn get_task_tx(conn: &Connection, id: &Uuid) -> Result<Option<Task>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS),
            [id.to_string()],
            task_row_mapper,
        )
        .optional()?;
    row.map(Task::try_from).transpose()
}

fn tags_to_json(tags: &[String]) -> Result<Option<String>> {
    if tags.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(tags)?))
    }
}

fn assert_user_exists(conn: &Connection, id: &Uuid) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)",
        [id.to_string()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("User {}", id)))
    }
}

impl Store {
    /// Create a task. A parent link is validated for same-project
    /// membership before the row is persisted.
    pub fn create_task(&self, actor: &Actor, new: NewTask) -> Result<Task> {
        validate_text("Task title", &new.title, MAX_TITLE_CHARS)?;
        validate_opt_text("Task description", new.description.as_deref(), MAX_DESCRIPTION_CHARS)?;
        validate_hours("Estimated hours", new.estimated_hours)?;
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
            assert_user_exists(conn, &new.creator_id)?;
            if let Some(ref assignee) = new.assignee_id {
                assert_user_exists(conn, assignee)?;
            }
            if let Some(ref parent) = new.parent_task_id {
                assert_valid_parent(conn, None, &new.project_id, parent)?;
            }

            conn.execute(
                r#"
                INSERT INTO tasks (id, project_id, title, description, status, priority,
                                   start_date, deadline, estimated_hours, completion, tags_json,
                                   creator_id, assignee_id, parent_task_id, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?13, ?13)
                "#,
                rusqlite::params![
                    id.to_string(),
                    new.project_id.to_string(),
                    new.title,
                    new.description,
                    new.priority.as_str(),
                    new.start_date.map(|t| t.to_rfc3339()),
                    new.deadline.map(|t| t.to_rfc3339()),
                    new.estimated_hours,
                    tags_to_json(&tags)?,
                    new.creator_id.to_string(),
                    new.assignee_id.map(|u| u.to_string()),
                    new.parent_task_id.map(|t| t.to_string()),
                    now,
                ],
            )?;

            let task = get_task_tx(conn, &id)?
                .ok_or_else(|| StoreError::Storage("Task vanished after insert".to_string()))?;
            record_audit(
                conn,
                actor,
                AuditAction::Create,
                RESOURCE,
                &id.to_string(),
                None,
                Some(&serde_json::to_value(&task)?),
            )?;
            Ok(task)
        })
    }

    pub fn get_task(&self, id: &Uuid) -> Result<Option<Task>> {
        self.read(|conn| get_task_tx(conn, id))
    }

    /// List tasks with AND-combined filters.
    ///
    /// Ordering is creation time descending, except deadline queries
    /// (`due_before` set) which order by deadline ascending.
    pub fn list_tasks(&self, filter: &TaskFilter, page: PageRequest) -> Result<Page<Task>> {
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
            if let Some(status) = filter.status {
                conditions.push("status = ?".to_string());
                params.push(Box::new(status.as_str()));
            }
            if let Some(priority) = filter.priority {
                conditions.push("priority = ?".to_string());
                params.push(Box::new(priority.as_str()));
            }
            if let Some(assignee_id) = filter.assignee_id {
                conditions.push("assignee_id = ?".to_string());
                params.push(Box::new(assignee_id.to_string()));
            }
            if let Some(parent_task_id) = filter.parent_task_id {
                conditions.push("parent_task_id = ?".to_string());
                params.push(Box::new(parent_task_id.to_string()));
            }
            if let Some(ref tag) = tag {
                conditions.push(
                    "tags_json IS NOT NULL AND EXISTS (SELECT 1 FROM json_each(tags_json) WHERE value = ?)"
                        .to_string(),
                );
                params.push(Box::new(tag.clone()));
            }
            if let Some(due_before) = filter.due_before {
                conditions.push("deadline IS NOT NULL AND deadline <= ?".to_string());
                params.push(Box::new(due_before.to_rfc3339()));
            }

            let where_clause = if conditions.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", conditions.join(" AND "))
            };
            let order_clause = if filter.due_before.is_some() {
                " ORDER BY deadline ASC, id"
            } else {
                " ORDER BY created_at DESC, id"
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM tasks{}", where_clause),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let query = format!(
                "SELECT {} FROM tasks{}{} LIMIT ? OFFSET ?",
                TASK_COLUMNS, where_clause, order_clause
            );
            params.push(Box::new(i64::from(page_size)));
            params.push(Box::new(page.offset()));

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), task_row_mapper)?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row?.try_into()?);
            }
            Ok(Page::new(items, page_no, page_size, total as u64))
        })
    }

    /// Apply a partial update. A parent-link change re-runs the hierarchy
    /// guard against the task's current project.
    pub fn update_task(&self, actor: &Actor, id: &Uuid, update: TaskUpdate) -> Result<Task> {
        if let Some(ref title) = update.title {
            validate_text("Task title", title, MAX_TITLE_CHARS)?;
        }
        if let Some(Some(ref description)) = update.description {
            validate_opt_text(
                "Task description",
                Some(description.as_str()),
                MAX_DESCRIPTION_CHARS,
            )?;
        }
        if let Some(hours) = update.estimated_hours {
            validate_hours("Estimated hours", hours)?;
        }
        if let Some(hours) = update.actual_hours {
            validate_hours("Actual hours", hours)?;
        }
        if let Some(completion) = update.completion {
            validate_completion(completion)?;
        }
        let tags = update.tags.as_deref().map(normalize_tags).transpose()?;

        self.write_tx(|conn| {
            let before = get_task_tx(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Task {}", id)))?;

            if let Some(Some(ref assignee)) = update.assignee_id {
                assert_user_exists(conn, assignee)?;
            }
            if let Some(Some(ref parent)) = update.parent_task_id {
                assert_valid_parent(conn, Some(id), &before.project_id, parent)?;
            }

            let title = update.title.clone().unwrap_or_else(|| before.title.clone());
            let description = match update.description {
                Some(ref value) => value.clone(),
                None => before.description.clone(),
            };
            let status = update.status.unwrap_or(before.status);
            let priority = update.priority.unwrap_or(before.priority);
            let start_date = update.start_date.unwrap_or(before.start_date);
            let deadline = update.deadline.unwrap_or(before.deadline);
            let estimated_hours = update.estimated_hours.unwrap_or(before.estimated_hours);
            let actual_hours = update.actual_hours.unwrap_or(before.actual_hours);
            let completion = update.completion.unwrap_or(before.completion);
            let tags = tags.unwrap_or_else(|| before.tags.clone());
            let assignee_id = update.assignee_id.unwrap_or(before.assignee_id);
            let parent_task_id = update.parent_task_id.unwrap_or(before.parent_task_id);

            conn.execute(
                r#"
                UPDATE tasks
                SET title = ?1, description = ?2, status = ?3, priority = ?4, start_date = ?5,
                    deadline = ?6, estimated_hours = ?7, actual_hours = ?8, completion = ?9,
                    tags_json = ?10, assignee_id = ?11, parent_task_id = ?12, updated_at = ?13
                WHERE id = ?14
                "#,
                rusqlite::params![
                    title,
                    description,
                    status.as_str(),
                    priority.as_str(),
                    start_date.map(|t| t.to_rfc3339()),
                    deadline.map(|t| t.to_rfc3339()),
                    estimated_hours,
                    actual_hours,
                    i64::from(completion),
                    tags_to_json(&tags)?,
                    assignee_id.map(|u| u.to_string()),
                    parent_task_id.map(|t| t.to_string()),
                    now_rfc3339(),
                    id.to_string(),
                ],
            )?;

            let after = get_task_tx(conn, id)?
                .ok_or_else(|| StoreError::Storage("Task vanished after update".to_string()))?;
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

    /// Delete a task.
    ///
    /// A task with children is rejected with `Conflict` unless `cascade`
    /// is requested, in which case the children are re-parented to the
    /// deleted task's own parent (root when it has none). Subtrees are
    /// never silently deleted.
    pub fn delete_task(&self, actor: &Actor, id: &Uuid, cascade: bool) -> Result<()> {
        self.write_tx(|conn| {
            let before = get_task_tx(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Task {}", id)))?;

            if has_children(conn, id)? {
                if !cascade {
                    return Err(StoreError::Conflict(format!(
                        "Task {} has subtasks; delete with cascade to re-parent them",
                        id
                    )));
                }
                reparent_children(conn, id, before.parent_task_id.as_ref())?;
            }

            conn.execute("DELETE FROM tasks WHERE id = ?", [id.to_string()])?;

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

    // --- Task-note links ---

    /// Link a note to a task. Idempotent: attaching an already-linked pair
    /// is a no-op success and appends no audit entry. Cross-project links
    /// are rejected.
    pub fn attach_note(&self, actor: &Actor, task_id: &Uuid, note_id: &Uuid) -> Result<()> {
        self.write_tx(|conn| {
            let task = get_task_tx(conn, task_id)?
                .ok_or_else(|| StoreError::NotFound(format!("Task {}", task_id)))?;
            let note = get_note_tx(conn, note_id)?
                .ok_or_else(|| StoreError::NotFound(format!("Note {}", note_id)))?;
            if task.project_id != note.project_id {
                return Err(StoreError::InvalidInput(
                    "Task and note belong to different projects".to_string(),
                ));
            }

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO task_notes (task_id, note_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![task_id.to_string(), note_id.to_string(), now_rfc3339()],
            )?;

            if inserted > 0 {
                let link = serde_json::json!({
                    "task_id": task_id,
                    "note_id": note_id,
                });
                record_audit(
                    conn,
                    actor,
                    AuditAction::Create,
                    LINK_RESOURCE,
                    &format!("{}:{}", task_id, note_id),
                    None,
                    Some(&link),
                )?;
            }
            Ok(())
        })
    }

    /// Unlink a note from a task. Idempotent: detaching a non-existent
    /// link is a no-op success.
    pub fn detach_note(&self, actor: &Actor, task_id: &Uuid, note_id: &Uuid) -> Result<()> {
        self.write_tx(|conn| {
            let removed = conn.execute(
                "DELETE FROM task_notes WHERE task_id = ?1 AND note_id = ?2",
                rusqlite::params![task_id.to_string(), note_id.to_string()],
            )?;

            if removed > 0 {
                let link = serde_json::json!({
                    "task_id": task_id,
                    "note_id": note_id,
                });
                record_audit(
                    conn,
                    actor,
                    AuditAction::Delete,
                    LINK_RESOURCE,
                    &format!("{}:{}", task_id, note_id),
                    Some(&link),
                    None,
                )?;
            }
            Ok(())
        })
    }

    /// Notes linked to a task, newest link first.
    pub fn list_task_notes(&self, task_id: &Uuid) -> Result<Vec<Note>> {
        self.read(|conn| {
            let task_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?)",
                [task_id.to_string()],
                |row| row.get(0),
            )?;
            if !task_exists {
                return Err(StoreError::NotFound(format!("Task {}", task_id)));
            }

            let mut stmt = conn.prepare(
                "SELECT n.id, n.project_id, n.title, n.content, n.file_path, n.size_bytes,
                        n.is_pinned, n.tags_json, n.created_at, n.updated_at
                 FROM task_notes tn
                 JOIN notes n ON n.id = tn.note_id
                 WHERE tn.task_id = ?
                 ORDER BY tn.created_at DESC",
            )?;
            let rows = stmt.query_map([task_id.to_string()], note_row_mapper)?;

            let mut notes = Vec::new();
            for row in rows {
                notes.push(row?.try_into()?);
            }
            Ok(notes)
        })
    }

    /// Tasks linked to a note, newest link first.
    pub fn list_note_tasks(&self, note_id: &Uuid) -> Result<Vec<Task>> {
        self.read(|conn| {
            let note_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?)",
                [note_id.to_string()],
                |row| row.get(0),
            )?;
            if !note_exists {
                return Err(StoreError::NotFound(format!("Note {}", note_id)));
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM task_notes tn
                 JOIN tasks t ON t.id = tn.task_id
                 WHERE tn.note_id = ?
                 ORDER BY tn.created_at DESC",
                TASK_COLUMNS
                    .split(", ")
                    .map(|c| format!("t.{}", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))?;
            let rows = stmt.query_map([note_id.to_string()], task_row_mapper)?;

            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?.try_into()?);
            }
            Ok(tasks)
        })
    }
}
