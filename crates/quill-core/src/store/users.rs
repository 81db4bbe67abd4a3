//! User records and login attribution.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::audit::record_audit;
use crate::store::row::UserRow;
use crate::store::types::{Actor, AuditAction, NewUser, User, UserUpdate};
use crate::store::validation::{validate_email, validate_username};
use crate::store::{now_rfc3339, Store};

const RESOURCE: &str = "user";

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_active, \
                            last_login_at, created_at, updated_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        is_active: row.get(5)?,
        last_login_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(crate) fn get_user_tx(conn: &Connection, id: &Uuid) -> Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            [id.to_string()],
            user_from_row,
        )
        .optional()?;
    row.map(User::try_from).transpose()
}

impl Store {
    /// Create a user. The username is trimmed and lowercased before the
    /// uniqueness check; a duplicate username or email is a `Conflict`.
    pub fn create_user(&self, actor: &Actor, new: NewUser) -> Result<User> {
        let username = new.username.trim().to_lowercase();
        validate_username(&username)?;
        if let Some(ref email) = new.email {
            validate_email(email)?;
        }
        if new.password_hash.is_empty() {
            return Err(StoreError::InvalidInput(
                "Credential hash must not be empty".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = now_rfc3339();

        self.write_tx(|conn| {
            conn.execute(
                r#"
                INSERT INTO users (id, username, email, password_hash, role, is_active,
                                   created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
                "#,
                rusqlite::params![
                    id.to_string(),
                    username,
                    new.email,
                    new.password_hash,
                    new.role.as_str(),
                    now,
                ],
            )?;

            let user = get_user_tx(conn, &id)?
                .ok_or_else(|| StoreError::Storage("User vanished after insert".to_string()))?;
            let snapshot = serde_json::to_value(&user)?;
            record_audit(
                conn,
                actor,
                AuditAction::Create,
                RESOURCE,
                &id.to_string(),
                None,
                Some(&snapshot),
            )?;
            Ok(user)
        })
    }

    pub fn get_user(&self, id: &Uuid) -> Result<Option<User>> {
        self.read(|conn| get_user_tx(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.trim().to_lowercase();
        self.read(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
                    [username],
                    user_from_row,
                )
                .optional()?;
            row.map(User::try_from).transpose()
        })
    }

    /// List all users, newest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY created_at DESC",
                USER_COLUMNS
            ))?;
            let rows = stmt.query_map([], user_from_row)?;
            let mut users = Vec::new();
            for row in rows {
                users.push(row?.try_into()?);
            }
            Ok(users)
        })
    }

    /// Apply a partial update. Only supplied fields change; `updated_at`
    /// is refreshed.
    pub fn update_user(&self, actor: &Actor, id: &Uuid, update: UserUpdate) -> Result<User> {
        if let Some(Some(ref email)) = update.email {
            validate_email(email)?;
        }
        if let Some(ref hash) = update.password_hash {
            if hash.is_empty() {
                return Err(StoreError::InvalidInput(
                    "Credential hash must not be empty".to_string(),
                ));
            }
        }

        self.write_tx(|conn| {
            let before = get_user_tx(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("User {}", id)))?;

            let email = match update.email {
                Some(ref value) => value.clone(),
                None => before.email.clone(),
            };
            let password_hash = update
                .password_hash
                .unwrap_or_else(|| before.password_hash.clone());
            let role = update.role.unwrap_or(before.role);
            let is_active = update.is_active.unwrap_or(before.is_active);

            conn.execute(
                r#"
                UPDATE users
                SET email = ?1, password_hash = ?2, role = ?3, is_active = ?4, updated_at = ?5
                WHERE id = ?6
                "#,
                rusqlite::params![
                    email,
                    password_hash,
                    role.as_str(),
                    is_active,
                    now_rfc3339(),
                    id.to_string(),
                ],
            )?;

            let after = get_user_tx(conn, id)?
                .ok_or_else(|| StoreError::Storage("User vanished after update".to_string()))?;
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

    /// Stamp a successful login and append a `login` audit entry. The
    /// calling layer verifies the credential; this only records the fact.
    pub fn record_login(&self, actor: &Actor, user_id: &Uuid) -> Result<User> {
        self.write_tx(|conn| {
            let before = get_user_tx(conn, user_id)?
                .ok_or_else(|| StoreError::NotFound(format!("User {}", user_id)))?;
            if !before.is_active {
                return Err(StoreError::InvalidInput(
                    "User account is deactivated".to_string(),
                ));
            }

            conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
                rusqlite::params![now_rfc3339(), user_id.to_string()],
            )?;

            let after = get_user_tx(conn, user_id)?
                .ok_or_else(|| StoreError::Storage("User vanished after login".to_string()))?;
            record_audit(
                conn,
                actor,
                AuditAction::Login,
                RESOURCE,
                &user_id.to_string(),
                None,
                Some(&serde_json::to_value(&after)?),
            )?;
            Ok(after)
        })
    }
}
