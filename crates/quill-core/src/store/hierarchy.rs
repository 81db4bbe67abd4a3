//! Parent-task link validation and re-parenting.
//!
//! A parent link is valid when the parent exists, lives in the same
//! project, and adopting it creates no cycle. The ancestor walk is
//! depth-bounded so corrupt data cannot loop forever.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Ancestor chains longer than this are treated as corrupt.
const MAX_HIERARCHY_DEPTH: usize = 64;

fn task_link_row(conn: &Connection, id: &Uuid) -> Result<Option<(String, Option<String>)>> {
    conn.query_row(
        "SELECT project_id, parent_task_id FROM tasks WHERE id = ?",
        [id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(Into::into)
}

/// Validate a candidate parent link for `child_id` (`None` while the child
/// is still being created, in which case no cycle is possible).
pub(crate) fn assert_valid_parent(
    conn: &Connection,
    child_id: Option<&Uuid>,
    project_id: &Uuid,
    parent_id: &Uuid,
) -> Result<()> {
    if child_id == Some(parent_id) {
        return Err(StoreError::InvalidHierarchy(
            "A task cannot be its own parent".to_string(),
        ));
    }

    let (parent_project, mut next) = task_link_row(conn, parent_id)?
        .ok_or_else(|| StoreError::NotFound(format!("Task {}", parent_id)))?;
    if parent_project != project_id.to_string() {
        return Err(StoreError::InvalidHierarchy(
            "Parent task belongs to a different project".to_string(),
        ));
    }

    let Some(child_id) = child_id else {
        return Ok(());
    };
    let child = child_id.to_string();

    // Walk from the candidate parent toward the root. Finding the child
    // along the way means the link would close a cycle.
    let mut depth = 0;
    while let Some(ancestor) = next {
        if ancestor == child {
            return Err(StoreError::InvalidHierarchy(
                "Parent link would make the task its own ancestor".to_string(),
            ));
        }
        depth += 1;
        if depth >= MAX_HIERARCHY_DEPTH {
            return Err(StoreError::InvalidHierarchy(format!(
                "Ancestor chain exceeds {} levels",
                MAX_HIERARCHY_DEPTH
            )));
        }
        let ancestor_id = crate::store::row::parse_uuid("ancestor task", &ancestor)?;
        next = match task_link_row(conn, &ancestor_id)? {
            Some((_, parent)) => parent,
            None => None,
        };
    }

    Ok(())
}

/// Whether the task has direct children.
pub(crate) fn has_children(conn: &Connection, task_id: &Uuid) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE parent_task_id = ?)",
        [task_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Re-parent every direct child of `task_id` to `new_parent` (root when
/// `None`). Used when a parent task is deleted with explicit cascade.
pub(crate) fn reparent_children(
    conn: &Connection,
    task_id: &Uuid,
    new_parent: Option<&Uuid>,
) -> Result<usize> {
    let moved = conn.execute(
        "UPDATE tasks SET parent_task_id = ?1 WHERE parent_task_id = ?2",
        rusqlite::params![new_parent.map(|id| id.to_string()), task_id.to_string()],
    )?;
    Ok(moved)
}
