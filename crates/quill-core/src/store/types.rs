//! Core data types for the store layer.
//!
//! Domain records, creation builders, partial-update patches, list filters,
//! and the pagination envelope. Tags are decoded to `Vec<String>` at this
//! boundary; the storage format (JSON array column) never leaks to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum page size for list operations.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default result limit for full-text search.
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Maximum result limit for full-text search.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            other => Err(StoreError::InvalidInput(format!(
                "Unknown role: {}",
                other
            ))),
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(StoreError::InvalidInput(format!(
                "Unknown task status: {}",
                other
            ))),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            other => Err(StoreError::InvalidInput(format!(
                "Unknown task priority: {}",
                other
            ))),
        }
    }
}

/// Audit trail action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            "login" => Ok(AuditAction::Login),
            other => Err(StoreError::InvalidInput(format!(
                "Unknown audit action: {}",
                other
            ))),
        }
    }
}

/// Actor identity attached to every mutating operation.
///
/// The store does not authenticate; it trusts the identity the calling
/// layer resolved and uses it for audit attribution only. `user_id` of
/// `None` marks a system action.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    /// An actor for system-initiated mutations (no attributed user).
    pub fn system() -> Self {
        Self::default()
    }

    /// An actor attributed to a user.
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_client(mut self, ip: impl Into<String>, agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self.user_agent = Some(agent.into());
        self
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    /// Opaque credential hash; hashing is the calling layer's concern.
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project owning notes and tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Display color as `#RRGGBB`.
    pub color: String,
    pub is_archived: bool,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A note within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub content: String,
    /// Logical path, unique within the owning project.
    pub file_path: String,
    /// Content size in bytes, derived on every write.
    pub size_bytes: u64,
    pub is_pinned: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task within a project, optionally part of a subtask hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    /// Completion percentage, 0..=100.
    pub completion: u8,
    pub tags: Vec<String>,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    /// Attributed user; `None` for system actions.
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    /// Full-record snapshot before the mutation; absent on create.
    pub old_values: Option<serde_json::Value>,
    /// Full-record snapshot after the mutation; absent on delete.
    pub new_values: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- Creation builders ---

/// Builder for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            password_hash: password_hash.into(),
            role: UserRole::User,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }
}

/// Builder for creating a new project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub owner_id: Uuid,
}

impl NewProject {
    pub fn new(name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: "#6366f1".to_string(),
            owner_id,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// Builder for creating a new note.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub project_id: Uuid,
    pub title: String,
    pub content: String,
    pub file_path: String,
    pub is_pinned: bool,
    pub tags: Vec<String>,
}

impl NewNote {
    pub fn new(
        project_id: Uuid,
        title: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            title: title.into(),
            content: String::new(),
            file_path: file_path.into(),
            is_pinned: false,
            tags: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.is_pinned = true;
        self
    }
}

/// Builder for creating a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub start_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub tags: Vec<String>,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
}

impl NewTask {
    pub fn new(project_id: Uuid, title: impl Into<String>, creator_id: Uuid) -> Self {
        Self {
            project_id,
            title: title.into(),
            description: None,
            priority: TaskPriority::Medium,
            start_date: None,
            deadline: None,
            estimated_hours: None,
            tags: Vec::new(),
            creator_id,
            assignee_id: None,
            parent_task_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_assignee(mut self, assignee_id: Uuid) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }
}

// --- Partial-update patches ---

/// Partial update for a user. Only supplied fields change.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<Option<String>>,
    pub password_hash: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

/// Partial update for a project. Only supplied fields change.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    pub is_archived: Option<bool>,
}

/// Partial update for a note. Only supplied fields change.
#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub file_path: Option<String>,
    pub is_pinned: Option<bool>,
    pub tags: Option<Vec<String>>,
}

/// Partial update for a task. Only supplied fields change.
///
/// `assignee_id` and `parent_task_id` use a double `Option`: the outer
/// level means "change this field", the inner level is the new value
/// (`None` clears it).
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub estimated_hours: Option<Option<f64>>,
    pub actual_hours: Option<Option<f64>>,
    pub completion: Option<u8>,
    pub tags: Option<Vec<String>>,
    pub assignee_id: Option<Option<Uuid>>,
    pub parent_task_id: Option<Option<Uuid>>,
}

// --- List filters ---

/// Filter for listing projects. Conditions combine with AND.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub owner_id: Option<Uuid>,
    pub is_archived: Option<bool>,
}

/// Filter for listing notes. Conditions combine with AND.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub project_id: Option<Uuid>,
    pub is_pinned: Option<bool>,
    pub tag: Option<String>,
}

/// Filter for listing tasks. Conditions combine with AND.
///
/// When `due_before` is set, results order by deadline ascending instead
/// of creation time descending.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub tag: Option<String>,
    pub due_before: Option<DateTime<Utc>>,
}

/// Filter for querying the audit trail. Conditions combine with AND.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub action: Option<AuditAction>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

// --- Pagination ---

/// Page request: 1-based page number plus page size.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Validate bounds, returning `(page, page_size)`.
    pub(crate) fn validated(&self) -> Result<(u32, u32)> {
        if self.page < 1 {
            return Err(StoreError::InvalidInput(
                "Page number must be at least 1".to_string(),
            ));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(StoreError::InvalidInput(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok((self.page, self.page_size))
    }

    pub(crate) fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// Paginated result envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub(crate) fn new(items: Vec<T>, page: u32, page_size: u32, total_items: u64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            total_items.div_ceil(u64::from(page_size)) as u32
        };
        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1 && total_pages > 0,
        }
    }
}
