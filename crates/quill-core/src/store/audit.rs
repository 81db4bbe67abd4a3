//! Append-only audit trail.
//!
//! `record_audit` runs inside the caller's active transaction, so an audit
//! entry commits if and only if the mutation it describes commits. No
//! operation in this crate updates or deletes audit rows.

use rusqlite::Connection;

use crate::error::Result;
use crate::store::row::AuditRow;
use crate::store::types::{Actor, AuditAction, AuditEntry, AuditFilter, Page, PageRequest};
use crate::store::{now_rfc3339, Store};

/// Append one audit entry inside the caller's transaction.
///
/// Snapshots are full-record JSON, not diffs: `old` is absent on create,
/// `new` is absent on delete, both are present on update.
pub(crate) fn record_audit(
    conn: &Connection,
    actor: &Actor,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    old: Option<&serde_json::Value>,
    new: Option<&serde_json::Value>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO audit_log (
            user_id, action, resource_type, resource_id,
            old_values, new_values, ip_address, user_agent, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        rusqlite::params![
            actor.user_id.map(|id| id.to_string()),
            action.as_str(),
            resource_type,
            resource_id,
            old.map(|v| v.to_string()),
            new.map(|v| v.to_string()),
            actor.ip_address,
            actor.user_agent,
            now_rfc3339(),
        ],
    )?;
    Ok(())
}

impl Store {
    /// Query the audit trail, newest first.
    pub fn list_audit(&self, filter: &AuditFilter, page: PageRequest) -> Result<Page<AuditEntry>> {
        let (page_no, page_size) = page.validated()?;

        self.read(|conn| {
            let mut conditions: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(user_id) = filter.user_id {
                conditions.push("user_id = ?".to_string());
                params.push(Box::new(user_id.to_string()));
            }
            if let Some(ref resource_type) = filter.resource_type {
                conditions.push("resource_type = ?".to_string());
                params.push(Box::new(resource_type.clone()));
            }
            if let Some(action) = filter.action {
                conditions.push("action = ?".to_string());
                params.push(Box::new(action.as_str()));
            }
            if let Some(since) = filter.since {
                conditions.push("created_at >= ?".to_string());
                params.push(Box::new(since.to_rfc3339()));
            }
            if let Some(until) = filter.until {
                conditions.push("created_at <= ?".to_string());
                params.push(Box::new(until.to_rfc3339()));
            }

            let where_clause = if conditions.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", conditions.join(" AND "))
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM audit_log{}", where_clause),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let query = format!(
                "SELECT id, user_id, action, resource_type, resource_id,
                        old_values, new_values, ip_address, user_agent, created_at
                 FROM audit_log{}
                 ORDER BY created_at DESC, id DESC
                 LIMIT ? OFFSET ?",
                where_clause
            );
            params.push(Box::new(i64::from(page_size)));
            params.push(Box::new(page.offset()));

            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(AuditRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    action: row.get(2)?,
                    resource_type: row.get(3)?,
                    resource_id: row.get(4)?,
                    old_values: row.get(5)?,
                    new_values: row.get(6)?,
                    ip_address: row.get(7)?,
                    user_agent: row.get(8)?,
                    created_at: row.get(9)?,
                })
            })?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row?.try_into()?);
            }

            Ok(Page::new(items, page_no, page_size, total as u64))
        })
    }
}
