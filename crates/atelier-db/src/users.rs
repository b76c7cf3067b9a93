use atelier_common::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use uuid::Uuid;

use crate::pool::Database;
use crate::timestamps;

/// Registered account row. The password hash never serializes out.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new account. A duplicate email surfaces as a conflict;
    /// hashing happens in the caller, never here.
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<User> {
        if email.trim().is_empty() {
            return Err(Error::Validation("email cannot be empty".into()));
        }
        if password_hash.is_empty() {
            return Err(Error::Validation("password hash cannot be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let conn = self.db.conn()?;
        let inserted = conn.execute(
            "INSERT INTO users (id, email, password_hash, name, avatar_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![id, email, password_hash, name, avatar_url, now, now],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::Conflict(format!("email already registered: {email}")));
            }
            Err(e) => return Err(Error::Database(format!("failed to insert user: {e}"))),
        }
        drop(conn);

        self.get_user_by_id(&id)
            .await?
            .ok_or_else(|| Error::Database("inserted user row not found".into()))
    }

    /// Read-only lookup; returns `None` on no match, never errs for it.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one(
            "SELECT id, email, password_hash, name, avatar_url, created_at, updated_at
             FROM users WHERE email = ?",
            email,
        )
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        self.fetch_one(
            "SELECT id, email, password_hash, name, avatar_url, created_at, updated_at
             FROM users WHERE id = ?",
            user_id,
        )
    }

    fn fetch_one(&self, sql: &str, key: &str) -> Result<Option<User>> {
        let conn = self.db.conn()?;
        conn.query_row(sql, params![key], row_to_user)
            .optional()
            .map_err(|e| Error::Database(format!("failed to fetch user: {e}")))
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        avatar_url: row.get(4)?,
        created_at: timestamps::parse(&created_at_str).map_err(timestamps::conversion_err)?,
        updated_at: timestamps::parse(&updated_at_str).map_err(timestamps::conversion_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::UserStore;
    use crate::pool::Database;

    fn store() -> UserStore {
        UserStore::new(Database::in_memory().expect("failed to open in-memory database"))
    }

    #[tokio::test]
    async fn create_and_fetch_by_email_round_trip() {
        let users = store();
        let created = users
            .create_user("ada@example.com", "pbkdf2-sha256$1$AA==$AA==", Some("Ada"), None)
            .await
            .expect("create_user should succeed");

        let fetched = users
            .get_user_by_email("ada@example.com")
            .await
            .expect("lookup should succeed")
            .expect("user should exist");

        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name.as_deref(), Some("Ada"));
        assert_eq!(fetched.password_hash, "pbkdf2-sha256$1$AA==$AA==");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let users = store();
        users
            .create_user("dup@example.com", "hash-a", None, None)
            .await
            .expect("first create should succeed");

        let second = users.create_user("dup@example.com", "hash-b", None, None).await;
        assert!(matches!(second, Err(atelier_common::Error::Conflict(_))));
    }

    #[tokio::test]
    async fn missing_user_is_none_not_error() {
        let users = store();
        let missing = users
            .get_user_by_email("nobody@example.com")
            .await
            .expect("lookup should not error");
        assert!(missing.is_none());

        let missing = users
            .get_user_by_id("no-such-id")
            .await
            .expect("lookup should not error");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn empty_email_is_rejected_before_any_query() {
        let users = store();
        let result = users.create_user("  ", "hash", None, None).await;
        assert!(matches!(result, Err(atelier_common::Error::Validation(_))));
    }
}
