//! Raw row types for database queries, before parsing into domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::types::{
    AuditAction, AuditEntry, Note, Project, Task, TaskPriority, TaskStatus, User, UserRole,
};

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StoreError::Storage(format!("Invalid {} UUID: {}", field, e)))
}

pub(crate) fn parse_opt_uuid(field: &str, value: Option<&str>) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(field, v)).transpose()
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("Invalid {} timestamp: {}", field, e)))
}

pub(crate) fn parse_opt_timestamp(
    field: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(field, v)).transpose()
}

pub(crate) fn parse_tags(value: Option<&str>) -> Result<Vec<String>> {
    match value {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| StoreError::Storage(format!("Invalid tags JSON: {}", e))),
        None => Ok(Vec::new()),
    }
}

/// Raw row from the `users` table.
#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid("user", &row.id)?,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: UserRole::parse(&row.role)
                .map_err(|_| StoreError::Storage(format!("Invalid role: {}", row.role)))?,
            is_active: row.is_active,
            last_login_at: parse_opt_timestamp("last_login_at", row.last_login_at.as_deref())?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

/// Raw row from the `projects` table.
#[derive(Debug)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub is_archived: bool,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Project {
            id: parse_uuid("project", &row.id)?,
            name: row.name,
            description: row.description,
            color: row.color,
            is_archived: row.is_archived,
            owner_id: parse_uuid("owner", &row.owner_id)?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

/// Raw row from the `notes` table.
#[derive(Debug)]
pub struct NoteRow {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub content: String,
    pub file_path: String,
    pub size_bytes: i64,
    pub is_pinned: bool,
    pub tags_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<NoteRow> for Note {
    type Error = StoreError;

    fn try_from(row: NoteRow) -> Result<Self> {
        Ok(Note {
            id: parse_uuid("note", &row.id)?,
            project_id: parse_uuid("project", &row.project_id)?,
            title: row.title,
            content: row.content,
            file_path: row.file_path,
            size_bytes: row.size_bytes.max(0) as u64,
            is_pinned: row.is_pinned,
            tags: parse_tags(row.tags_json.as_deref())?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

/// Raw row from the `tasks` table.
#[derive(Debug)]
pub struct TaskRow {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub start_date: Option<String>,
    pub deadline: Option<String>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub completion: i64,
    pub tags_json: Option<String>,
    pub creator_id: String,
    pub assignee_id: Option<String>,
    pub parent_task_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: parse_uuid("task", &row.id)?,
            project_id: parse_uuid("project", &row.project_id)?,
            title: row.title,
            description: row.description,
            status: TaskStatus::parse(&row.status)
                .map_err(|_| StoreError::Storage(format!("Invalid status: {}", row.status)))?,
            priority: TaskPriority::parse(&row.priority).map_err(|_| {
                StoreError::Storage(format!("Invalid priority: {}", row.priority))
            })?,
            start_date: parse_opt_timestamp("start_date", row.start_date.as_deref())?,
            deadline: parse_opt_timestamp("deadline", row.deadline.as_deref())?,
            estimated_hours: row.estimated_hours,
            actual_hours: row.actual_hours,
            completion: row.completion.clamp(0, 100) as u8,
            tags: parse_tags(row.tags_json.as_deref())?,
            creator_id: parse_uuid("creator", &row.creator_id)?,
            assignee_id: parse_opt_uuid("assignee", row.assignee_id.as_deref())?,
            parent_task_id: parse_opt_uuid("parent task", row.parent_task_id.as_deref())?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

/// Raw row from the `audit_log` table.
#[derive(Debug)]
pub struct AuditRow {
    pub id: i64,
    pub user_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self> {
        let parse_snapshot = |value: Option<&str>| -> Result<Option<serde_json::Value>> {
            value
                .map(|v| {
                    serde_json::from_str(v).map_err(|e| {
                        StoreError::Storage(format!("Invalid audit snapshot JSON: {}", e))
                    })
                })
                .transpose()
        };

        Ok(AuditEntry {
            id: row.id,
            user_id: parse_opt_uuid("actor", row.user_id.as_deref())?,
            action: AuditAction::parse(&row.action)
                .map_err(|_| StoreError::Storage(format!("Invalid action: {}", row.action)))?,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            old_values: parse_snapshot(row.old_values.as_deref())?,
            new_values: parse_snapshot(row.new_values.as_deref())?,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}
